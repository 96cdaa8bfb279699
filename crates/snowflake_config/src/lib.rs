//! Typed configuration collections persisted in the key-value store.
//!
//! A collection is a set of sections whose options are described by a
//! [`ConfigurationSchema`]. Values are stored lazily: the first read of an
//! option writes its declared default, and every later read (through any
//! handle) observes that stored value.
//!
//! ```rust,ignore
//! let store = ConfigurationCollectionStore::open(StoreConfig::sqlite(path)).await?;
//! let config = store.create_configuration::<Display>("Player 1").await?;
//!
//! let video = config.section("video")?;
//! assert!(video.get::<bool>("fullscreen").await?);
//! video.set("fullscreen", &false).await?;
//! store.update_configuration(&config).await?;
//! ```

mod accessor;
mod collection;
mod descriptor;
mod error;
mod locks;
mod records;
mod store;
mod value;

pub use accessor::{ConfigurationCollection, SectionView};
pub use collection::ValueCollection;
pub use descriptor::{CollectionDescriptor, ConfigurationSchema, OptionDescriptor, SectionDescriptor};
pub use error::{ConfigError, Result};
pub use records::{CollectionRecord, ValueEntry};
pub use store::ConfigurationCollectionStore;
pub use value::{ConfigValue, OptionType};

pub use snowflake_ids::{CollectionId, ValueId};
pub use snowflake_kv::{KeyValueStore, StoreConfig};
