//! Resolved locations shared by every command.

use super::error::HelpfulError;
use anyhow::Context;
use snowflake_config::{ConfigurationCollectionStore, StoreConfig};
use std::path::{Path, PathBuf};

/// Store file name under the home directory
pub const STORE_FILE: &str = "config.sqlite3";

#[derive(Debug, Clone)]
pub struct CliContext {
    home: PathBuf,
    store_path: PathBuf,
}

impl CliContext {
    /// Resolve the home directory and the store path (`--store` wins).
    pub fn resolve(store: Option<PathBuf>) -> anyhow::Result<Self> {
        let home = snowflake_logging::snowflake_home()?;
        let store_path = store.unwrap_or_else(|| home.join(STORE_FILE));
        Ok(Self::new(home, store_path))
    }

    pub fn new(home: PathBuf, store_path: PathBuf) -> Self {
        Self { home, store_path }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    /// Open the store, creating it if needed.
    pub async fn open_store(&self) -> anyhow::Result<ConfigurationCollectionStore> {
        ConfigurationCollectionStore::open(StoreConfig::sqlite(&self.store_path))
            .await
            .with_context(|| format!("Failed to open store at {}", self.store_path.display()))
    }

    /// Open a store that must already exist. Read commands use this so a
    /// mistyped path is reported instead of silently creating an empty store.
    pub async fn open_existing_store(&self) -> anyhow::Result<ConfigurationCollectionStore> {
        if !self.store_path.exists() {
            return Err(HelpfulError::store_not_found(&self.store_path).into());
        }
        self.open_store().await
    }
}
