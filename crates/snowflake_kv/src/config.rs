//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// SQLite database file (created if missing).
    File(PathBuf),
    /// Private in-memory database (for testing).
    Memory,
}

/// Key-value store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// Maximum connections in the pool
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl StoreConfig {
    /// Create SQLite configuration for a database file.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Create in-memory SQLite configuration.
    ///
    /// Uses a single connection: every SQLite in-memory connection is its
    /// own database, so a larger pool would split the data.
    pub fn sqlite_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Set maximum connections. Ignored for in-memory stores.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        if self.location != StoreLocation::Memory {
            self.max_connections = max.max(1);
        }
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Human-readable location for logs.
    pub fn describe(&self) -> String {
        match &self.location {
            StoreLocation::File(path) => path.display().to_string(),
            StoreLocation::Memory => ":memory:".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_pins_single_connection() {
        let config = StoreConfig::sqlite_memory().with_max_connections(8);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.describe(), ":memory:");
    }

    #[test]
    fn test_file_config_respects_max_connections() {
        let config = StoreConfig::sqlite("/tmp/kv.sqlite3").with_max_connections(3);
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.location, StoreLocation::File(PathBuf::from("/tmp/kv.sqlite3")));
    }
}
