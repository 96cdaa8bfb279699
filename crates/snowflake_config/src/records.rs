//! Persisted configuration records and their key layout.
//!
//! ```text
//! config/collection/{collection-id}                   -> CollectionRecord
//! config/index/{collection-id}/{section}/{option}     -> ValueId
//! config/value/{value-id}                             -> ValueEntry
//! ```

use crate::error::{ConfigError, Result};
use crate::value::ConfigValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snowflake_ids::{CollectionId, ValueId};
use std::borrow::Cow;

/// Collection metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub collection_id: CollectionId,
    pub display_name: String,
    pub schema_name: String,
    pub created_at: DateTime<Utc>,
}

/// One stored option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEntry {
    pub value_id: ValueId,
    pub collection_id: CollectionId,
    pub section: String,
    pub option: String,
    pub value: ConfigValue,
}

impl ValueEntry {
    /// Check that `value` may replace this entry's value when no option
    /// descriptor is at hand: same kind, and storable.
    pub(crate) fn check_replacement(&self, value: &ConfigValue) -> Result<()> {
        if self.value.same_kind(value) && value.is_storable() {
            return Ok(());
        }
        Err(ConfigError::option_mismatch(
            &self.section,
            &self.option,
            format!("expected {}, got {}", self.value.type_name(), value),
        ))
    }
}

pub(crate) const COLLECTION_PREFIX: &str = "config/collection/";

pub(crate) fn collection_key(id: &CollectionId) -> String {
    format!("{}{}", COLLECTION_PREFIX, id)
}

pub(crate) fn index_prefix(id: &CollectionId) -> String {
    format!("config/index/{}/", id)
}

pub(crate) fn index_key(id: &CollectionId, section: &str, option: &str) -> String {
    format!("config/index/{}/{}/{}", id, escape_segment(section), escape_segment(option))
}

/// Keep a name within one key segment: `%` and `/` are percent-encoded.
fn escape_segment(name: &str) -> Cow<'_, str> {
    if name.contains(['%', '/']) {
        Cow::Owned(name.replace('%', "%25").replace('/', "%2F"))
    } else {
        Cow::Borrowed(name)
    }
}

pub(crate) fn value_key(id: &ValueId) -> String {
    format!("config/value/{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_keys_share_collection_prefix() {
        let id = CollectionId::new();
        let key = index_key(&id, "video", "fullscreen");
        assert!(key.starts_with(&index_prefix(&id)));
        assert!(!index_key(&CollectionId::new(), "video", "fullscreen").starts_with(&index_prefix(&id)));
    }

    #[test]
    fn test_slashes_in_names_do_not_collide() {
        let id = CollectionId::new();
        assert_ne!(index_key(&id, "a/b", "c"), index_key(&id, "a", "b/c"));
        assert_ne!(index_key(&id, "a%2Fb", "c"), index_key(&id, "a/b", "c"));
        assert_eq!(index_key(&id, "video", "scale"), format!("config/index/{}/video/scale", id));
        let key = index_key(&id, "a/b", "c");
        assert_eq!(key.matches('/').count(), index_key(&id, "ab", "c").matches('/').count());
    }

    #[test]
    fn test_collection_key_uses_prefix() {
        let id = CollectionId::new();
        assert_eq!(collection_key(&id), format!("config/collection/{}", id));
        assert!(collection_key(&id).starts_with(COLLECTION_PREFIX));
    }
}
