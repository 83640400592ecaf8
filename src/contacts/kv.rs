//! Key-value persistence: the sole durability primitive for contacts.
//!
//! Values are opaque UTF-8 strings written whole. Two backends:
//! - [`MemoryKeyValueStore`] — in-process map, used by tests and dry runs
//! - [`SqliteKeyValueStore`] — single `kv_store` table via `sqlx`

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, trace};

/// Schema for the key-value table.
const KV_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

/// Async string key-value storage.
///
/// `set` must replace the value atomically: readers observe either the old
/// or the new value, never a partial write.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`KvError`] if the backend cannot be written.
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
}

/// Errors from key-value backends.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend is unusable (poisoned lock, closed pool, ...).
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-process key-value store.
///
/// Uses a sync [`Mutex`] since the critical section is brief (no awaits).
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let map = self
            .entries
            .lock()
            .map_err(|e| KvError::Unavailable(format!("lock poisoned: {e}")))?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut map = self
            .entries
            .lock()
            .map_err(|e| KvError::Unavailable(format!("lock poisoned: {e}")))?;
        map.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

/// SQLite-backed key-value store.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Open (or create) the database file at `path` and ensure the schema.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Database`] if the file cannot be opened or the
    /// schema cannot be created.
    pub async fn open(path: &Path) -> Result<Self, KvError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        debug!(path = %path.display(), "key-value database opened");
        Self::with_pool(db).await
    }

    /// Wrap an existing pool and ensure the schema.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Database`] if the schema cannot be created.
    pub async fn with_pool(db: SqlitePool) -> Result<Self, KvError> {
        sqlx::query(KV_SCHEMA).execute(&db).await?;
        Ok(Self { db })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
             updated_at = datetime('now')",
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await?;
        trace!(key, bytes = value.len(), "key-value entry written");
        Ok(())
    }
}
