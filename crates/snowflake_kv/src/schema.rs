//! Table creation for the key-value store.

use crate::error::Result;
use crate::KeyValueStore;
use tracing::debug;

impl KeyValueStore {
    /// Ensure the record table exists.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS kv_records (
                key TEXT PRIMARY KEY NOT NULL,
                type_tag TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Key-value schema verified");
        Ok(())
    }
}
