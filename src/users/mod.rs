//! User Directory
//!
//! User records for an externally-authenticated population: sign-in only
//! binds an email to the provider's `authId`. Also keeps the device push
//! token the notification collaborator needs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::models::UserSummary;

/// User directory backed by the shared SQLite database.
pub struct UserDirectory {
    db_path: PathBuf,
}

impl UserDirectory {
    /// Create a new user directory, initializing the schema if needed.
    pub async fn new(base_dir: &Path) -> Result<Self> {
        let db_path = base_dir.join("chat.sqlite");

        let directory = Self { db_path };
        directory.init_db().await?;

        info!("[Users] Initialized");
        Ok(directory)
    }

    /// Get database connection
    async fn get_pool(&self) -> Result<sqlx::SqlitePool> {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}", self.db_path.display()))?
                .create_if_missing(true);
        Ok(SqlitePoolOptions::new().connect_with(options).await?)
    }

    /// Initialize database tables
    async fn init_db(&self) -> Result<()> {
        let pool = self.get_pool().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                auth_id TEXT UNIQUE NOT NULL,
                push_token TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        pool.close().await;
        Ok(())
    }

    /// Record a user on first sign-in.
    pub async fn sign_in(&self, email: String, auth_id: String) -> Result<UserSummary> {
        let pool = self.get_pool().await?;

        let user = UserSummary {
            email,
            id: Uuid::new_v4().to_string(),
        };
        sqlx::query("INSERT INTO users (id, email, auth_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(&auth_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await
            .context("Failed to register user")?;

        pool.close().await;

        info!("[Users] Signed in: {}", user.email);
        Ok(user)
    }

    /// Resolve the internal user id for an auth provider id.
    pub async fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<String>> {
        let pool = self.get_pool().await?;
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE auth_id = ?")
            .bind(auth_id)
            .fetch_optional(&pool)
            .await?;
        pool.close().await;
        Ok(row.map(|(id,)| id))
    }

    pub async fn find_by_id(&self, user_id: &str) -> Result<Option<UserSummary>> {
        let pool = self.get_pool().await?;
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT email, id FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&pool)
                .await?;
        pool.close().await;
        Ok(row.map(|(email, id)| UserSummary { email, id }))
    }

    /// Users whose email contains `term`.
    pub async fn search(&self, term: &str) -> Result<Vec<UserSummary>> {
        let pool = self.get_pool().await?;
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT email, id FROM users WHERE email LIKE ? ORDER BY email",
        )
        .bind(format!("%{}%", term))
        .fetch_all(&pool)
        .await?;
        pool.close().await;
        Ok(rows
            .into_iter()
            .map(|(email, id)| UserSummary { email, id })
            .collect())
    }

    /// Public records for a set of user ids; unknown ids are skipped.
    pub async fn summaries(&self, ids: &[String]) -> Result<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.get_pool().await?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let query = format!("SELECT email, id FROM users WHERE id IN ({placeholders})");
        let mut rows = sqlx::query_as::<_, (String, String)>(&query);
        for id in ids {
            rows = rows.bind(id);
        }
        let rows = rows.fetch_all(&pool).await?;
        pool.close().await;

        Ok(rows
            .into_iter()
            .map(|(email, id)| UserSummary { email, id })
            .collect())
    }

    /// Update the account email.
    pub async fn update_email(&self, user_id: &str, email: &str) -> Result<()> {
        let pool = self.get_pool().await?;
        let result = sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind(email)
            .bind(user_id)
            .execute(&pool)
            .await?;
        pool.close().await;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("User not found: {}", user_id));
        }
        Ok(())
    }

    /// Store the device token used for push notifications.
    pub async fn update_push_token(&self, user_id: &str, token: &str) -> Result<()> {
        let pool = self.get_pool().await?;
        let result = sqlx::query("UPDATE users SET push_token = ? WHERE id = ?")
            .bind(token)
            .bind(user_id)
            .execute(&pool)
            .await?;
        pool.close().await;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("User not found: {}", user_id));
        }
        info!("[Users] Push token updated for {}", user_id);
        Ok(())
    }

    /// Device token for a user, if one was registered.
    pub async fn push_token(&self, user_id: &str) -> Result<Option<String>> {
        let pool = self.get_pool().await?;
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT push_token FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&pool)
                .await?;
        pool.close().await;
        Ok(row.and_then(|(token,)| token))
    }
}
