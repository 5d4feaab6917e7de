use std::fs;
use std::path::PathBuf;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

const KEY_CREDENTIAL: &str = "credential";
const KEY_LAST_SYNC: &str = "last_sync";
const KEY_PENDING_UPLOAD: &str = "pending_upload";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
}

/// Durable sync state: the credential, the last successful sync
/// timestamp, and the pending-upload flag. These keys are private to
/// the sync agent; nothing else writes them.
#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, StateError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn new_at(db_path: &PathBuf) -> Result<Self, StateError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn new_default() -> Result<Self, StateError> {
        Self::new_at(&default_db_path()?).await
    }

    pub async fn init(&self) -> Result<(), StateError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_credential(&self, token: &str) -> Result<(), StateError> {
        self.set(KEY_CREDENTIAL, token).await
    }

    pub async fn credential(&self) -> Result<Option<String>, StateError> {
        let value = self.get(KEY_CREDENTIAL).await?;
        Ok(value.filter(|token| !token.is_empty()))
    }

    pub async fn record_last_sync(&self, timestamp: &str) -> Result<(), StateError> {
        self.set(KEY_LAST_SYNC, timestamp).await
    }

    pub async fn last_sync(&self) -> Result<Option<String>, StateError> {
        self.get(KEY_LAST_SYNC).await
    }

    pub async fn set_pending_upload(&self, pending: bool) -> Result<(), StateError> {
        self.set(KEY_PENDING_UPLOAD, if pending { "true" } else { "false" })
            .await
    }

    pub async fn pending_upload(&self) -> Result<bool, StateError> {
        Ok(self.get(KEY_PENDING_UPLOAD).await?.as_deref() == Some("true"))
    }

    /// Forget the credential and the last-sync timestamp. The
    /// pending-upload flag is deliberately left alone so an unsynced
    /// local change stays visible after a reconnect.
    pub async fn disconnect(&self) -> Result<(), StateError> {
        self.delete(KEY_CREDENTIAL).await?;
        self.delete(KEY_LAST_SYNC).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let row = sqlx::query("SELECT value FROM sync_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row.try_get("value")?))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        sqlx::query(
            "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        sqlx::query("DELETE FROM sync_state WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn default_db_path() -> Result<PathBuf, StateError> {
    let base = dirs::data_dir().ok_or(StateError::MissingDataDir)?;
    Ok(base.join("rollbook").join("state.db"))
}
