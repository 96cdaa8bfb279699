//! Error types for the key-value store.

use thiserror::Error;

/// Key-value store result type.
pub type Result<T> = std::result::Result<T, KvError>;

/// Key-value store errors.
#[derive(Error, Debug)]
pub enum KvError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The value could not be encoded; nothing was written.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The stored payload cannot be read back as the requested type.
    #[error("Type mismatch for key '{key}': stored {stored}, requested {requested}: {source}")]
    TypeMismatch {
        key: String,
        stored: String,
        requested: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A stored row is not a well-formed record.
    #[error("Invalid record for key '{key}': {reason}")]
    InvalidRecord { key: String, reason: String },

    /// A blocking entry point was used where the thread must not block.
    #[error("Blocking call not allowed: {0}")]
    Blocking(String),
}

impl KvError {
    /// Whether this error reports a payload/type incompatibility.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}
