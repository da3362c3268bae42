//! Friend Request & Contacts Module
//!
//! Handles friend requests and established contacts. Stored in the same
//! SQLite database as the user directory.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

/// Friend manager handles all friend-related operations
pub struct FriendManager {
    db_path: PathBuf,
}

impl FriendManager {
    /// Create new friend manager
    pub async fn new(base_dir: &Path) -> Result<Self> {
        let db_path = base_dir.join("chat.sqlite");

        let manager = Self { db_path };
        manager.init_db().await?;

        info!("[Friends] Initialized");
        Ok(manager)
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
            CREATE TABLE IF NOT EXISTS friend_requests (
                id TEXT PRIMARY KEY,
                from_user_id TEXT NOT NULL,
                to_user_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                responded_at TEXT,
                UNIQUE(from_user_id, to_user_id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                contact_user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, contact_user_id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        pool.close().await;
        Ok(())
    }

    /// Record a pending friend request.
    pub async fn send_request(&self, from_user_id: &str, to_user_id: &str) -> Result<()> {
        if from_user_id == to_user_id {
            return Err(anyhow::anyhow!("Cannot send a friend request to yourself"));
        }

        let pool = self.get_pool().await?;

        // Check if already friends
        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM contacts WHERE
             (user_id = ? AND contact_user_id = ?) OR
             (user_id = ? AND contact_user_id = ?)",
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .bind(to_user_id)
        .bind(from_user_id)
        .fetch_optional(&pool)
        .await?;

        if existing.is_some() {
            return Err(anyhow::anyhow!("Already friends with this user"));
        }

        // Check for existing request
        let existing_req: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM friend_requests
             WHERE from_user_id = ? AND to_user_id = ? AND status = 'pending'",
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .fetch_optional(&pool)
        .await?;

        if existing_req.is_some() {
            return Err(anyhow::anyhow!("Friend request already pending"));
        }

        sqlx::query(
            "INSERT INTO friend_requests (id, from_user_id, to_user_id, status, created_at)
             VALUES (?, ?, ?, 'pending', ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(from_user_id)
        .bind(to_user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await?;

        pool.close().await;

        info!("[Friends] Request sent: {} -> {}", from_user_id, to_user_id);
        Ok(())
    }

    /// Accept a pending request, establishing the contact on both sides.
    pub async fn accept_request(&self, from_user_id: &str, to_user_id: &str) -> Result<()> {
        let pool = self.get_pool().await?;

        let pending: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM friend_requests
             WHERE from_user_id = ? AND to_user_id = ? AND status = 'pending'",
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .fetch_optional(&pool)
        .await?;

        let Some((request_id,)) = pending else {
            return Err(anyhow::anyhow!("No pending request to accept"));
        };

        let now = Utc::now();
        sqlx::query("UPDATE friend_requests SET status = 'accepted', responded_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(&request_id)
            .execute(&pool)
            .await?;

        // Contact entries are bidirectional
        for (user, contact) in [(from_user_id, to_user_id), (to_user_id, from_user_id)] {
            sqlx::query(
                "INSERT OR IGNORE INTO contacts (id, user_id, contact_user_id, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(user)
            .bind(contact)
            .bind(now.to_rfc3339())
            .execute(&pool)
            .await?;
        }

        pool.close().await;

        info!("[Friends] Request {} accepted, contacts created", request_id);
        Ok(())
    }

    /// Ids of a user's established contacts.
    pub async fn contact_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let pool = self.get_pool().await?;
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT contact_user_id FROM contacts WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&pool)
        .await?;
        pool.close().await;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Ids of users with a pending request towards `user_id`.
    pub async fn received_request_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let pool = self.get_pool().await?;
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT from_user_id FROM friend_requests
             WHERE to_user_id = ? AND status = 'pending'
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&pool)
        .await?;
        pool.close().await;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Directly add `contact_user_id` to `user_id`'s contact list and
    /// return the updated list of contact ids.
    pub async fn add_contact(&self, user_id: &str, contact_user_id: &str) -> Result<Vec<String>> {
        if user_id == contact_user_id {
            return Err(anyhow::anyhow!("Cannot add yourself as a contact"));
        }

        let pool = self.get_pool().await?;
        sqlx::query(
            "INSERT OR IGNORE INTO contacts (id, user_id, contact_user_id, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(contact_user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await?;
        pool.close().await;

        self.contact_ids(user_id).await
    }
}
