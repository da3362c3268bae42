//! Message Log
//!
//! Durable store for messages submitted over the request path. The relay
//! core never reads from here; only the REST surface does. Records carry an
//! expiry a week after creation and are swept periodically.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::models::StoredMessage;

/// Messages returned per conversation page, newest first.
pub const PAGE_SIZE: i64 = 5;

/// How long a stored message lives.
const RETENTION_DAYS: i64 = 7;

/// Durable message log backed by SQLite.
pub struct MessageStore {
    db_path: PathBuf,
}

impl MessageStore {
    /// Create a new message store, initializing the schema if needed.
    pub async fn new(base_dir: &Path) -> Result<Self> {
        let db_path = base_dir.join("chat.sqlite");

        let store = Self { db_path };
        store.init_db().await?;

        info!("[Messages] Initialized at {:?}", store.db_path);
        Ok(store)
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
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                from_user TEXT NOT NULL,
                to_user TEXT NOT NULL,
                message TEXT NOT NULL,
                title TEXT,
                created_at TEXT NOT NULL,
                expire_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        pool.close().await;
        Ok(())
    }

    /// Persist one message, assigning its identifier and expiry.
    pub async fn save(
        &self,
        from: &str,
        to: &str,
        message: &str,
        title: Option<String>,
    ) -> Result<StoredMessage> {
        let created_at = Utc::now();
        let record = StoredMessage {
            id: Uuid::new_v4().to_string(),
            message: message.to_string(),
            title,
            from: from.to_string(),
            to: to.to_string(),
            created_at,
            expire_at: created_at + Duration::days(RETENTION_DAYS),
        };

        let pool = self.get_pool().await?;
        sqlx::query(
            "INSERT INTO messages (id, from_user, to_user, message, title, created_at, expire_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.from)
        .bind(&record.to)
        .bind(&record.message)
        .bind(&record.title)
        .bind(record.created_at.to_rfc3339())
        .bind(record.expire_at.to_rfc3339())
        .execute(&pool)
        .await
        .context("Failed to insert message")?;
        pool.close().await;

        Ok(record)
    }

    /// One page of the conversation between `me` and `you`, newest first.
    ///
    /// `cursor` is a message id; with `before` the page continues into
    /// older messages, otherwise into newer ones. Insert order (rowid) is
    /// the pagination order, so identical timestamps cannot shuffle pages.
    pub async fn conversation_page(
        &self,
        me: &str,
        you: &str,
        cursor: Option<&str>,
        before: bool,
    ) -> Result<Vec<StoredMessage>> {
        let pool = self.get_pool().await?;

        let base = "SELECT id, from_user, to_user, message, title, created_at, expire_at
             FROM messages
             WHERE ((from_user = ?1 AND to_user = ?2) OR (from_user = ?2 AND to_user = ?1))";
        let query = match (cursor, before) {
            (None, _) => format!("{base} ORDER BY rowid DESC LIMIT {PAGE_SIZE}"),
            (Some(_), true) => format!(
                "{base} AND rowid < (SELECT rowid FROM messages WHERE id = ?3)
                 ORDER BY rowid DESC LIMIT {PAGE_SIZE}"
            ),
            (Some(_), false) => format!(
                "{base} AND rowid > (SELECT rowid FROM messages WHERE id = ?3)
                 ORDER BY rowid DESC LIMIT {PAGE_SIZE}"
            ),
        };

        let mut rows = sqlx::query_as::<
            _,
            (String, String, String, String, Option<String>, String, String),
        >(&query)
        .bind(me)
        .bind(you);
        if let Some(cursor) = cursor {
            rows = rows.bind(cursor);
        }
        let rows = rows
            .fetch_all(&pool)
            .await
            .context("Failed to query conversation")?;
        pool.close().await;

        Ok(rows
            .into_iter()
            .map(
                |(id, from, to, message, title, created_at, expire_at)| StoredMessage {
                    id,
                    message,
                    title,
                    from,
                    to,
                    created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                    expire_at: expire_at.parse().unwrap_or_else(|_| Utc::now()),
                },
            )
            .collect())
    }

    /// Delete every message past its expiry. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let pool = self.get_pool().await?;
        let result = sqlx::query("DELETE FROM messages WHERE expire_at <= ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await?;
        pool.close().await;
        Ok(result.rows_affected())
    }
}
