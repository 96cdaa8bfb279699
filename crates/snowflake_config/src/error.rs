//! Error types for configuration collections.

use snowflake_ids::{CollectionId, ValueId};
use snowflake_kv::KvError;
use thiserror::Error;

/// Configuration result type.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors.
///
/// Absence at read boundaries is reported as `Ok(None)`, not as an error.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Underlying key-value store failure
    #[error("Store error: {0}")]
    Store(#[from] KvError),

    /// A value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A collection or value the operation requires does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A value is incompatible with the declared type, or a collection was
    /// loaded with a schema other than the one it was created with
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A freshly allocated identifier already exists
    #[error("Identity conflict: {0}")]
    IdentityConflict(String),

    #[error("Unknown section '{0}'")]
    UnknownSection(String),

    #[error("Unknown option '{option}' in section '{section}'")]
    UnknownOption { section: String, option: String },
}

impl ConfigError {
    pub(crate) fn collection_not_found(id: &CollectionId) -> Self {
        Self::NotFound(format!("collection {}", id))
    }

    pub(crate) fn value_not_found(value_id: &ValueId, collection_id: &CollectionId) -> Self {
        Self::NotFound(format!("value {} in collection {}", value_id, collection_id))
    }

    pub(crate) fn option_mismatch(section: &str, option: &str, reason: impl std::fmt::Display) -> Self {
        Self::TypeMismatch(format!("{}.{}: {}", section, option, reason))
    }

    /// Whether this error reports a type or schema incompatibility, at
    /// either the configuration or the storage layer.
    pub fn is_type_mismatch(&self) -> bool {
        match self {
            Self::TypeMismatch(_) => true,
            Self::Store(err) => err.is_type_mismatch(),
            _ => false,
        }
    }
}
