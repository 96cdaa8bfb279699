//! Typed object key-value store for Snowflake.
//!
//! Maps string keys to any `serde`-serializable value. Payloads are stored as
//! JSON together with a shape tag, so a later typed read either reconstructs
//! the value or fails with [`KvError::TypeMismatch`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use snowflake_kv::{KeyValueStore, OnConflict, StoreConfig};
//!
//! let store = KeyValueStore::open(StoreConfig::sqlite("/tmp/kv.sqlite3")).await?;
//! store.put("greeting", "hello").await?;
//! store.put_with("greeting", "ignored", OnConflict::Ignore).await?;
//! let value: Option<String> = store.get("greeting").await?;
//! ```
//!
//! Every operation has a `_blocking` twin for synchronous callers.
//! Multi-statement read-then-write sequences go through [`KvTransaction`].

pub mod blocking;
mod config;
mod error;
mod objects;
mod schema;
mod transaction;
mod types;

pub use config::{StoreConfig, StoreLocation};
pub use error::{KvError, Result};
pub use transaction::KvTransaction;
pub use types::{to_json, KeyRecord, OnConflict, TypeTag};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

/// Key-value store handle.
///
/// Cheap to clone; clones share one connection pool. Every mutating call is
/// committed before it returns.
#[derive(Clone, Debug)]
pub struct KeyValueStore {
    pool: SqlitePool,
}

impl KeyValueStore {
    /// Open or create a store. Creates the table if it doesn't exist.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let options = match &config.location {
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
            }
            StoreLocation::Memory => SqliteConnectOptions::new().in_memory(true),
        }
        .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            // Keep the one in-memory connection alive; dropping it drops the data.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(location = %config.describe(), "Key-value store opened");
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub async fn open_memory() -> Result<Self> {
        Self::open(StoreConfig::sqlite_memory()).await
    }

    /// Get the underlying connection pool (escape hatch for diagnostics).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the store's connections.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Current time as milliseconds since Unix epoch.
    pub(crate) fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("kv.sqlite3");

        let store = KeyValueStore::open(StoreConfig::sqlite(&db_path)).await.unwrap();
        assert!(db_path.exists());

        store.close().await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("kv.sqlite3");

        let store = KeyValueStore::open(StoreConfig::sqlite(&db_path)).await.unwrap();
        store.put("persisted", &42).await.unwrap();
        store.close().await;

        let store = KeyValueStore::open(StoreConfig::sqlite(&db_path)).await.unwrap();
        assert_eq!(store.get::<i32>("persisted").await.unwrap(), Some(42));
    }
}
