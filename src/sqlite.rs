//! SQLite storage medium.
//!
//! A durable host medium for native targets, standing in for the browser's
//! key/value storage:
//! - WAL mode for concurrent readers
//! - Single-file, survives process restarts

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::error::{Result, StateError};
use crate::medium::{validate_key, StorageMedium};

/// SQLite implementation of StorageMedium.
#[derive(Debug)]
pub struct SqliteMedium {
    pool: SqlitePool,
}

impl SqliteMedium {
    /// Open or create a SQLite medium at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite medium at {:?}", path);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| StateError::Medium(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StateError::Medium(e.to_string()))?;

        let medium = Self { pool };
        medium.init_schema().await?;
        Ok(medium)
    }

    /// Create an in-memory SQLite medium (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StateError::Medium(e.to_string()))?;

        // A second connection would see a different in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StateError::Medium(e.to_string()))?;

        let medium = Self { pool };
        medium.init_schema().await?;
        Ok(medium)
    }

    /// Close the underlying pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite medium schema initialized");
        Ok(())
    }

    fn now_unix() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageMedium for SqliteMedium {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;

        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Self::now_unix())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
