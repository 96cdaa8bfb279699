//! Striped locks guarding first access to an option.

use snowflake_ids::CollectionId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

const DEFAULT_STRIPES: usize = 64;

/// Serializes "lookup, create default if absent" per (collection, section,
/// option) within this process. Unrelated keys may share a stripe; that only
/// costs some waiting.
#[derive(Debug)]
pub(crate) struct EnsureLocks {
    stripes: Vec<Mutex<()>>,
}

impl EnsureLocks {
    pub(crate) fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub(crate) fn with_stripes(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub(crate) async fn lock(
        &self,
        collection: &CollectionId,
        section: &str,
        option: &str,
    ) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        (collection, section, option).hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].lock().await
    }
}

impl Default for EnsureLocks {
    fn default() -> Self {
        Self::new()
    }
}
