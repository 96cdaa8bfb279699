//! Synchronous entry points.
//!
//! Each `_blocking` method runs its async twin to completion, so both forms
//! have identical results. Inside a multi-thread Tokio runtime the caller's
//! runtime drives the future via `block_in_place`; outside any runtime a
//! shared background runtime is used. Current-thread runtimes cannot block
//! without deadlocking, so calls from one fail with [`KvError::Blocking`].

use crate::error::{KvError, Result};
use crate::types::{KeyRecord, OnConflict};
use crate::{KeyValueStore, StoreConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

static BLOCKING_RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn shared_runtime() -> Result<&'static Runtime> {
    if let Some(runtime) = BLOCKING_RUNTIME.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("snowflake-blocking")
        .enable_all()
        .build()?;
    // A racing caller may have installed one first; theirs wins.
    Ok(BLOCKING_RUNTIME.get_or_init(|| runtime))
}

/// Run `future` to completion from synchronous code.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Err(KvError::Blocking(
                "cannot block inside a current-thread Tokio runtime; use the async API".to_string(),
            )),
            _ => Ok(tokio::task::block_in_place(|| handle.block_on(future))),
        },
        Err(_) => Ok(shared_runtime()?.block_on(future)),
    }
}

impl KeyValueStore {
    /// Blocking form of [`KeyValueStore::open`].
    pub fn open_blocking(config: StoreConfig) -> Result<Self> {
        block_on(Self::open(config))?
    }

    pub fn put_blocking<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        block_on(self.put(key, value))?
    }

    pub fn put_with_blocking<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        on_conflict: OnConflict,
    ) -> Result<bool> {
        block_on(self.put_with(key, value, on_conflict))?
    }

    pub fn put_many_blocking<K, V, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        block_on(self.put_many(entries))?
    }

    pub fn put_many_with_blocking<K, V, I>(&self, entries: I, on_conflict: OnConflict) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        block_on(self.put_many_with(entries, on_conflict))?
    }

    pub fn update_blocking<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<bool> {
        block_on(self.update(key, value))?
    }

    pub fn update_many_blocking<K, V, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Serialize,
    {
        block_on(self.update_many(entries))?
    }

    pub fn get_blocking<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        block_on(self.get(key))?
    }

    pub fn get_record_blocking(&self, key: &str) -> Result<Option<KeyRecord>> {
        block_on(self.get_record(key))?
    }

    pub fn get_many_blocking<T, K>(&self, keys: &[K]) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        block_on(self.get_many(keys))?
    }

    pub fn get_records_blocking<K: AsRef<str>>(&self, keys: &[K]) -> Result<HashMap<String, KeyRecord>> {
        block_on(self.get_records(keys))?
    }

    pub fn contains_blocking(&self, key: &str) -> Result<bool> {
        block_on(self.contains(key))?
    }

    pub fn list_keys_blocking(&self, prefix: &str) -> Result<Vec<String>> {
        block_on(self.list_keys(prefix))?
    }

    pub fn delete_blocking(&self, key: &str) -> Result<u64> {
        block_on(self.delete(key))?
    }

    pub fn delete_many_blocking<K: AsRef<str>>(&self, keys: &[K]) -> Result<u64> {
        block_on(self.delete_many(keys))?
    }
}
