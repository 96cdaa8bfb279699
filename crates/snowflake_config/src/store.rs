//! Collection-level lifecycle and direct value access.

use crate::accessor::ConfigurationCollection;
use crate::collection::ValueCollection;
use crate::descriptor::ConfigurationSchema;
use crate::error::{ConfigError, Result};
use crate::locks::EnsureLocks;
use crate::records::{self, CollectionRecord, ValueEntry};
use crate::value::ConfigValue;
use chrono::Utc;
use snowflake_ids::{CollectionId, ValueId};
use snowflake_kv::blocking::block_on;
use snowflake_kv::{KeyValueStore, OnConflict, StoreConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates, loads, updates and deletes configuration collections.
///
/// Cloning is cheap; clones share the underlying store and the first-access
/// locks, so collections loaded through any clone coordinate with each other.
#[derive(Debug, Clone)]
pub struct ConfigurationCollectionStore {
    kv: KeyValueStore,
    locks: Arc<EnsureLocks>,
}

impl ConfigurationCollectionStore {
    pub fn new(kv: KeyValueStore) -> Self {
        Self {
            kv,
            locks: Arc::new(EnsureLocks::new()),
        }
    }

    /// Open the backing key-value store and wrap it.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        Ok(Self::new(KeyValueStore::open(config).await?))
    }

    pub fn kv(&self) -> &KeyValueStore {
        &self.kv
    }

    fn bind<S: ConfigurationSchema>(&self, record: &CollectionRecord) -> ConfigurationCollection<S> {
        ConfigurationCollection::new(ValueCollection::new(
            record,
            S::descriptor(),
            self.kv.clone(),
            Arc::clone(&self.locks),
        ))
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Create an empty collection of schema `S`.
    ///
    /// No option values are stored until each is first read.
    pub async fn create_configuration<S: ConfigurationSchema>(
        &self,
        display_name: &str,
    ) -> Result<ConfigurationCollection<S>> {
        let record = CollectionRecord {
            collection_id: CollectionId::new(),
            display_name: display_name.to_string(),
            schema_name: S::descriptor().schema_name.clone(),
            created_at: Utc::now(),
        };

        let key = records::collection_key(&record.collection_id);
        if !self.kv.put_with(&key, &record, OnConflict::Ignore).await? {
            return Err(ConfigError::IdentityConflict(format!(
                "collection {} already exists",
                record.collection_id
            )));
        }

        info!(
            collection_id = %record.collection_id,
            schema = %record.schema_name,
            display_name,
            "Created configuration collection"
        );
        Ok(self.bind(&record))
    }

    /// Load a collection; `None` if the id is unknown.
    ///
    /// Fails with a type mismatch if the collection was created under a
    /// different schema.
    pub async fn get_configuration<S: ConfigurationSchema>(
        &self,
        collection_id: CollectionId,
    ) -> Result<Option<ConfigurationCollection<S>>> {
        let Some(record) = self.get_collection_record(collection_id).await? else {
            return Ok(None);
        };

        let expected = &S::descriptor().schema_name;
        if &record.schema_name != expected {
            return Err(ConfigError::TypeMismatch(format!(
                "collection {} uses schema '{}', not '{}'",
                collection_id, record.schema_name, expected
            )));
        }
        Ok(Some(self.bind(&record)))
    }

    /// Persist every value changed through `collection` since it was loaded.
    pub async fn update_configuration<S: ConfigurationSchema>(
        &self,
        collection: &ConfigurationCollection<S>,
    ) -> Result<()> {
        self.update_values(collection.values()).await
    }

    /// Persist the pending changes of a value collection.
    ///
    /// Values deleted since they were changed are skipped.
    pub async fn update_values(&self, values: &ValueCollection) -> Result<()> {
        let collection_id = values.id();
        if !self.kv.contains(&records::collection_key(&collection_id)).await? {
            values.clear();
            return Err(ConfigError::collection_not_found(&collection_id));
        }

        let dirty = values.dirty_entries();
        if dirty.is_empty() {
            debug!(%collection_id, "Nothing to update");
            return Ok(());
        }

        let mut payload = Vec::with_capacity(dirty.len());
        for entry in &dirty {
            payload.push((records::value_key(&entry.value_id), serde_json::to_value(entry)?));
        }
        let updated = self.kv.update_many(payload).await?;
        if updated < dirty.len() {
            warn!(
                %collection_id,
                expected = dirty.len(),
                updated,
                "Some changed values were deleted before the update"
            );
        }

        values.mark_persisted(&dirty);
        info!(%collection_id, updated, "Updated configuration collection");
        Ok(())
    }

    /// Remove a collection and every value it owns. Unknown ids are a no-op.
    ///
    /// Runs as one transaction that removes the collection record first, so
    /// a value materialized concurrently is either seen and removed here or
    /// refused because the collection is gone.
    pub async fn delete_configuration(&self, collection_id: CollectionId) -> Result<()> {
        let collection_key = records::collection_key(&collection_id);
        let mut tx = self.kv.begin().await?;
        let mut removed = tx.delete_many(&[collection_key.as_str()]).await?;

        let index_keys = tx.list_keys(&records::index_prefix(&collection_id)).await?;
        let value_ids: Vec<ValueId> = tx.get_many(&index_keys).await?;
        let mut keys = index_keys;
        keys.extend(value_ids.iter().map(records::value_key));
        removed += tx.delete_many(&keys).await?;
        tx.commit().await?;

        if removed > 0 {
            info!(%collection_id, removed, "Deleted configuration collection");
        } else {
            debug!(%collection_id, "Delete of unknown collection");
        }
        Ok(())
    }

    pub async fn get_collection_record(&self, collection_id: CollectionId) -> Result<Option<CollectionRecord>> {
        Ok(self.kv.get(&records::collection_key(&collection_id)).await?)
    }

    /// Every stored collection, oldest first.
    pub async fn list_configurations(&self) -> Result<Vec<CollectionRecord>> {
        let keys = self.kv.list_keys(records::COLLECTION_PREFIX).await?;
        let mut collections: Vec<CollectionRecord> = self.kv.get_many(&keys).await?;
        collections.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.collection_id.cmp(&b.collection_id))
        });
        Ok(collections)
    }

    /// Every value materialized for a collection, ordered by section and option.
    pub async fn list_values(&self, collection_id: CollectionId) -> Result<Vec<ValueEntry>> {
        let index_keys = self.kv.list_keys(&records::index_prefix(&collection_id)).await?;
        let value_ids: Vec<ValueId> = self.kv.get_many(&index_keys).await?;
        let value_keys: Vec<String> = value_ids.iter().map(records::value_key).collect();
        Ok(self.kv.get_many(&value_keys).await?)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Stored value by id, bypassing its collection.
    pub async fn get_value(&self, value_id: ValueId) -> Result<Option<ValueEntry>> {
        Ok(self.kv.get(&records::value_key(&value_id)).await?)
    }

    /// Overwrite a stored value and persist it immediately.
    ///
    /// The new value must be of the same kind as the stored one, and floats
    /// must be finite. Returns `None` if the value id is unknown.
    ///
    /// The store does not know the schema a collection was created with,
    /// only its name, so declared constraints beyond the kind are not
    /// checked here. In particular a selection may be set to a name its
    /// option does not declare; typed reads of that option then fail with a
    /// type mismatch. Go through [`ConfigurationCollection`] (or
    /// [`ValueCollection::set`]) to have the declared type enforced.
    pub async fn set_value(&self, value_id: ValueId, value: ConfigValue) -> Result<Option<ValueEntry>> {
        let key = records::value_key(&value_id);
        let Some(stored) = self.kv.get::<ValueEntry>(&key).await? else {
            return Ok(None);
        };
        stored.check_replacement(&value)?;

        let entry = ValueEntry { value, ..stored };
        if !self.kv.update(&key, &entry).await? {
            return Ok(None);
        }
        debug!(%value_id, collection_id = %entry.collection_id, "Set value");
        Ok(Some(entry))
    }

    /// Id of the collection owning a value.
    pub async fn get_owning_collection(&self, value_id: ValueId) -> Result<Option<CollectionId>> {
        Ok(self.get_value(value_id).await?.map(|entry| entry.collection_id))
    }

    // ========================================================================
    // Blocking forms
    // ========================================================================

    pub fn open_blocking(config: StoreConfig) -> Result<Self> {
        Ok(Self::new(KeyValueStore::open_blocking(config)?))
    }

    pub fn create_configuration_blocking<S: ConfigurationSchema>(
        &self,
        display_name: &str,
    ) -> Result<ConfigurationCollection<S>> {
        block_on(self.create_configuration(display_name))?
    }

    pub fn get_configuration_blocking<S: ConfigurationSchema>(
        &self,
        collection_id: CollectionId,
    ) -> Result<Option<ConfigurationCollection<S>>> {
        block_on(self.get_configuration(collection_id))?
    }

    pub fn update_configuration_blocking<S: ConfigurationSchema>(
        &self,
        collection: &ConfigurationCollection<S>,
    ) -> Result<()> {
        block_on(self.update_configuration(collection))?
    }

    pub fn update_values_blocking(&self, values: &ValueCollection) -> Result<()> {
        block_on(self.update_values(values))?
    }

    pub fn delete_configuration_blocking(&self, collection_id: CollectionId) -> Result<()> {
        block_on(self.delete_configuration(collection_id))?
    }

    pub fn get_collection_record_blocking(&self, collection_id: CollectionId) -> Result<Option<CollectionRecord>> {
        block_on(self.get_collection_record(collection_id))?
    }

    pub fn list_configurations_blocking(&self) -> Result<Vec<CollectionRecord>> {
        block_on(self.list_configurations())?
    }

    pub fn list_values_blocking(&self, collection_id: CollectionId) -> Result<Vec<ValueEntry>> {
        block_on(self.list_values(collection_id))?
    }

    pub fn get_value_blocking(&self, value_id: ValueId) -> Result<Option<ValueEntry>> {
        block_on(self.get_value(value_id))?
    }

    pub fn set_value_blocking(&self, value_id: ValueId, value: ConfigValue) -> Result<Option<ValueEntry>> {
        block_on(self.set_value(value_id, value))?
    }

    pub fn get_owning_collection_blocking(&self, value_id: ValueId) -> Result<Option<CollectionId>> {
        block_on(self.get_owning_collection(value_id))?
    }
}
