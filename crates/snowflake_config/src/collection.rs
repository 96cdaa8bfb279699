//! Value collections: the stored values of one configuration collection.

use crate::descriptor::{CollectionDescriptor, OptionDescriptor, SectionDescriptor};
use crate::error::{ConfigError, Result};
use crate::locks::EnsureLocks;
use crate::records::{self, CollectionRecord, ValueEntry};
use crate::value::ConfigValue;
use snowflake_ids::{CollectionId, ValueId};
use snowflake_kv::blocking::block_on;
use snowflake_kv::{KeyValueStore, OnConflict};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct CollectionState {
    entries: HashMap<ValueId, ValueEntry>,
    slots: HashMap<(String, String), ValueId>,
    /// Entries changed in memory and not yet written by an update
    dirty: HashSet<ValueId>,
}

impl CollectionState {
    fn insert(&mut self, entry: ValueEntry) {
        self.slots
            .insert((entry.section.clone(), entry.option.clone()), entry.value_id);
        self.entries.insert(entry.value_id, entry);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
        self.dirty.clear();
    }

    fn evict(&mut self, value_id: &ValueId) {
        if let Some(entry) = self.entries.remove(value_id) {
            self.slots.remove(&(entry.section, entry.option));
        }
        self.dirty.remove(value_id);
    }
}

/// The identified set of values belonging to one collection.
///
/// Reads go through the key-value store unless the caller has a pending
/// (not yet updated) change for that entry. Reading an option that has never
/// been stored writes its declared default first.
#[derive(Debug)]
pub struct ValueCollection {
    id: CollectionId,
    display_name: String,
    descriptor: &'static CollectionDescriptor,
    kv: KeyValueStore,
    locks: Arc<EnsureLocks>,
    state: Mutex<CollectionState>,
}

impl ValueCollection {
    pub(crate) fn new(
        record: &CollectionRecord,
        descriptor: &'static CollectionDescriptor,
        kv: KeyValueStore,
        locks: Arc<EnsureLocks>,
    ) -> Self {
        Self {
            id: record.collection_id,
            display_name: record.display_name.clone(),
            descriptor,
            kv,
            locks,
            state: Mutex::new(CollectionState::default()),
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn descriptor(&self) -> &'static CollectionDescriptor {
        self.descriptor
    }

    fn state(&self) -> MutexGuard<'_, CollectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending_slot(&self, section: &str, option: &str) -> Option<ValueEntry> {
        let state = self.state();
        let value_id = state.slots.get(&(section.to_string(), option.to_string()))?;
        if state.dirty.contains(value_id) {
            state.entries.get(value_id).cloned()
        } else {
            None
        }
    }

    fn pending_value(&self, value_id: &ValueId) -> Option<ValueEntry> {
        let state = self.state();
        if state.dirty.contains(value_id) {
            state.entries.get(value_id).cloned()
        } else {
            None
        }
    }

    fn remember(&self, entry: ValueEntry) {
        let mut state = self.state();
        if !state.dirty.contains(&entry.value_id) {
            state.insert(entry);
        }
    }

    fn stage(&self, entry: ValueEntry) {
        let mut state = self.state();
        state.dirty.insert(entry.value_id);
        state.insert(entry);
    }

    fn forget(&self, value_id: &ValueId) {
        self.state().evict(value_id);
    }

    /// Drop everything remembered; the collection no longer exists.
    pub(crate) fn clear(&self) {
        self.state().clear();
    }

    /// Return the entry for (section, option), creating and persisting it
    /// from the declared default if it has never been stored.
    pub async fn ensure_and_get(&self, section: &SectionDescriptor, option: &str) -> Result<ValueEntry> {
        let descriptor = section.require_option(option)?;
        if let Some(entry) = self.pending_slot(&section.name, option) {
            return Ok(entry);
        }

        let _guard = self.locks.lock(&self.id, &section.name, option).await;

        let index_key = records::index_key(&self.id, &section.name, option);
        if let Some(value_id) = self.kv.get::<ValueId>(&index_key).await? {
            match self.kv.get::<ValueEntry>(&records::value_key(&value_id)).await? {
                Some(entry) => {
                    self.remember(entry.clone());
                    return Ok(entry);
                }
                None => {
                    warn!(
                        collection_id = %self.id,
                        section = %section.name,
                        option,
                        %value_id,
                        "Index points at a missing value; recreating from default"
                    );
                    self.forget(&value_id);
                }
            }
        }

        self.materialize(section, descriptor, index_key).await
    }

    async fn materialize(
        &self,
        section: &SectionDescriptor,
        descriptor: &OptionDescriptor,
        index_key: String,
    ) -> Result<ValueEntry> {
        let entry = ValueEntry {
            value_id: ValueId::new(),
            collection_id: self.id,
            section: section.name.clone(),
            option: descriptor.name.clone(),
            value: descriptor.default.clone(),
        };
        let value_key = records::value_key(&entry.value_id);

        // Write first so the checks below run under the store's write lock;
        // a concurrent delete either finished before or starts after commit.
        let mut tx = self.kv.begin().await?;
        if tx.put_many_with([(value_key.as_str(), &entry)], OnConflict::Ignore).await? == 0 {
            return Err(ConfigError::IdentityConflict(format!(
                "value {} already exists",
                entry.value_id
            )));
        }

        if !tx.contains(&records::collection_key(&self.id)).await? {
            tx.rollback().await?;
            self.clear();
            return Err(ConfigError::collection_not_found(&self.id));
        }

        // Another store over the same file may have got here first.
        if let Some(existing_id) = tx.get::<ValueId>(&index_key).await? {
            if let Some(existing) = tx.get::<ValueEntry>(&records::value_key(&existing_id)).await? {
                tx.rollback().await?;
                self.remember(existing.clone());
                return Ok(existing);
            }
        }

        tx.put_many_with([(index_key, entry.value_id)], OnConflict::Replace)
            .await?;
        tx.commit().await?;

        debug!(
            collection_id = %self.id,
            section = %entry.section,
            option = %entry.option,
            value_id = %entry.value_id,
            "Materialized default value"
        );
        self.remember(entry.clone());
        Ok(entry)
    }

    /// Indexer-style access; same semantics as [`ensure_and_get`].
    ///
    /// [`ensure_and_get`]: ValueCollection::ensure_and_get
    pub async fn lookup(&self, section: &SectionDescriptor, option: &str) -> Result<ValueEntry> {
        self.ensure_and_get(section, option).await
    }

    /// Change the value of an entry of this collection in memory.
    ///
    /// The entry must still exist in the store. The change is written by the
    /// next collection update.
    pub async fn set(&self, value_id: ValueId, value: ConfigValue) -> Result<ValueEntry> {
        let stored = self
            .kv
            .get::<ValueEntry>(&records::value_key(&value_id))
            .await?
            .filter(|entry| entry.collection_id == self.id);
        let Some(stored) = stored else {
            self.forget(&value_id);
            return Err(ConfigError::value_not_found(&value_id, &self.id));
        };

        match self.descriptor.option(&stored.section, &stored.option) {
            Some(descriptor) => descriptor.check(&stored.section, &value)?,
            None => stored.check_replacement(&value)?,
        }

        let entry = ValueEntry { value, ..stored };
        self.stage(entry.clone());
        Ok(entry)
    }

    /// Assign a possibly-null value to (section, option).
    ///
    /// `Some` replaces the value. `None` on a string option writes the
    /// option's unset sentinel; `None` on any other option leaves the
    /// existing value untouched.
    pub async fn assign(
        &self,
        section: &SectionDescriptor,
        option: &str,
        value: Option<ConfigValue>,
    ) -> Result<ValueEntry> {
        let descriptor = section.require_option(option)?;
        let existing = self.ensure_and_get(section, option).await?;

        let value = match value {
            Some(value) => value,
            None => match (&descriptor.unset, descriptor.is_string()) {
                (Some(unset), true) => unset.clone(),
                _ => return Ok(existing),
            },
        };
        descriptor.check(&section.name, &value)?;

        let entry = ValueEntry { value, ..existing };
        self.stage(entry.clone());
        Ok(entry)
    }

    /// Clear a string option to its unset sentinel. No-op for other types.
    pub async fn unset(&self, section: &SectionDescriptor, option: &str) -> Result<ValueEntry> {
        self.assign(section, option, None).await
    }

    /// Entry by value id; `None` if it was deleted or belongs elsewhere.
    pub async fn get(&self, value_id: ValueId) -> Result<Option<ValueEntry>> {
        let stored = self.kv.get::<ValueEntry>(&records::value_key(&value_id)).await?;
        match stored {
            Some(entry) if entry.collection_id == self.id => {
                if let Some(pending) = self.pending_value(&value_id) {
                    return Ok(Some(pending));
                }
                self.remember(entry.clone());
                Ok(Some(entry))
            }
            _ => {
                self.forget(&value_id);
                Ok(None)
            }
        }
    }

    /// Snapshot of the entries touched through this handle.
    pub fn entries(&self) -> Vec<ValueEntry> {
        let mut entries: Vec<ValueEntry> = self.state().entries.values().cloned().collect();
        entries.sort_by(|a, b| (&a.section, &a.option).cmp(&(&b.section, &b.option)));
        entries
    }

    /// Whether any change is waiting for an update.
    pub fn is_dirty(&self) -> bool {
        !self.state().dirty.is_empty()
    }

    pub(crate) fn dirty_entries(&self) -> Vec<ValueEntry> {
        let state = self.state();
        state
            .dirty
            .iter()
            .filter_map(|id| state.entries.get(id).cloned())
            .collect()
    }

    /// Clear the dirty flag of entries whose in-memory value still equals
    /// what was written. Entries changed again meanwhile stay dirty.
    pub(crate) fn mark_persisted(&self, written: &[ValueEntry]) {
        let mut state = self.state();
        for entry in written {
            if state.entries.get(&entry.value_id) == Some(entry) {
                state.dirty.remove(&entry.value_id);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Blocking forms
    // ------------------------------------------------------------------------

    pub fn ensure_and_get_blocking(&self, section: &SectionDescriptor, option: &str) -> Result<ValueEntry> {
        block_on(self.ensure_and_get(section, option))?
    }

    pub fn lookup_blocking(&self, section: &SectionDescriptor, option: &str) -> Result<ValueEntry> {
        block_on(self.lookup(section, option))?
    }

    pub fn set_blocking(&self, value_id: ValueId, value: ConfigValue) -> Result<ValueEntry> {
        block_on(self.set(value_id, value))?
    }

    pub fn assign_blocking(
        &self,
        section: &SectionDescriptor,
        option: &str,
        value: Option<ConfigValue>,
    ) -> Result<ValueEntry> {
        block_on(self.assign(section, option, value))?
    }

    pub fn unset_blocking(&self, section: &SectionDescriptor, option: &str) -> Result<ValueEntry> {
        block_on(self.unset(section, option))?
    }

    pub fn get_blocking(&self, value_id: ValueId) -> Result<Option<ValueEntry>> {
        block_on(self.get(value_id))?
    }
}
