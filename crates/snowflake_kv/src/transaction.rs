//! Multi-statement transactions.
//!
//! A [`KvTransaction`] sees one consistent view of the store and commits all
//! of its writes together. Dropping it without [`KvTransaction::commit`]
//! (including when the owning future is cancelled) rolls everything back.
//!
//! SQLite takes the write lock at the first write statement. Callers that
//! read, decide and then write should issue a write first, so the decision
//! is made under the lock: reads taken before it may be stale, and a later
//! write on a stale snapshot fails instead of waiting.
//!
//! Transactions are async only; there is no `_blocking` form.

use crate::error::Result;
use crate::objects::{
    decode_in_order, delete_keys, encode_all, fetch_record, fetch_records, insert_encoded, key_exists,
    select_keys,
};
use crate::types::{KeyRecord, OnConflict};
use crate::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use tracing::debug;

/// An open store transaction.
pub struct KvTransaction {
    tx: Transaction<'static, Sqlite>,
    now: i64,
}

impl std::fmt::Debug for KvTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvTransaction").field("now", &self.now).finish_non_exhaustive()
    }
}

impl KeyValueStore {
    /// Begin a transaction. It holds one pooled connection until it ends.
    pub async fn begin(&self) -> Result<KvTransaction> {
        Ok(KvTransaction {
            tx: self.pool.begin().await?,
            now: Self::now_millis(),
        })
    }
}

impl KvTransaction {
    /// Store many entries with a conflict policy. Returns the number written.
    pub async fn put_many_with<K, V, I>(&mut self, entries: I, on_conflict: OnConflict) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        let encoded = encode_all(entries)?;
        let mut written = 0usize;
        for entry in &encoded {
            written += insert_encoded(&mut self.tx, entry, on_conflict, self.now).await? as usize;
        }
        Ok(written)
    }

    pub async fn get_record(&mut self, key: &str) -> Result<Option<KeyRecord>> {
        fetch_record(&mut self.tx, key).await
    }

    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_record(key).await? {
            Some(record) => record.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Present keys among `keys` as `T`, in the order of `keys`.
    pub async fn get_many<T, K>(&mut self, keys: &[K]) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let records = fetch_records(&mut self.tx, keys).await?;
        decode_in_order(keys, &records)
    }

    pub async fn contains(&mut self, key: &str) -> Result<bool> {
        key_exists(&mut self.tx, key).await
    }

    pub async fn list_keys(&mut self, prefix: &str) -> Result<Vec<String>> {
        select_keys(&mut self.tx, prefix).await
    }

    /// Remove every key in `keys`. Returns the number removed.
    pub async fn delete_many<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        delete_keys(&mut self.tx, keys).await
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
