//! Typed, schema-bound access to a value collection.

use crate::collection::ValueCollection;
use crate::descriptor::{CollectionDescriptor, ConfigurationSchema, SectionDescriptor};
use crate::error::{ConfigError, Result};
use crate::records::ValueEntry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snowflake_ids::CollectionId;
use snowflake_kv::blocking::block_on;
use std::fmt;
use std::marker::PhantomData;

/// A configuration collection loaded under schema `S`.
pub struct ConfigurationCollection<S: ConfigurationSchema> {
    values: ValueCollection,
    _schema: PhantomData<fn() -> S>,
}

impl<S: ConfigurationSchema> ConfigurationCollection<S> {
    pub(crate) fn new(values: ValueCollection) -> Self {
        Self {
            values,
            _schema: PhantomData,
        }
    }

    pub fn id(&self) -> CollectionId {
        self.values.id()
    }

    pub fn display_name(&self) -> &str {
        self.values.display_name()
    }

    /// The untyped value collection behind this view.
    pub fn values(&self) -> &ValueCollection {
        &self.values
    }

    pub fn descriptor(&self) -> &'static CollectionDescriptor {
        S::descriptor()
    }

    /// Accessor for one section.
    pub fn section(&self, name: &str) -> Result<SectionView<'_>> {
        let descriptor = S::descriptor()
            .section(name)
            .ok_or_else(|| ConfigError::UnknownSection(name.to_string()))?;
        Ok(SectionView {
            values: &self.values,
            descriptor,
        })
    }

    pub fn sections(&self) -> impl Iterator<Item = SectionView<'_>> {
        S::descriptor().sections().iter().map(move |descriptor| SectionView {
            values: &self.values,
            descriptor,
        })
    }
}

impl<S: ConfigurationSchema> fmt::Debug for ConfigurationCollection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationCollection")
            .field("schema", &S::descriptor().schema_name)
            .field("values", &self.values)
            .finish()
    }
}

/// Read/write access to the options of one section.
#[derive(Debug, Clone, Copy)]
pub struct SectionView<'a> {
    values: &'a ValueCollection,
    descriptor: &'a SectionDescriptor,
}

impl<'a> SectionView<'a> {
    pub fn descriptor(&self) -> &'a SectionDescriptor {
        self.descriptor
    }

    pub fn name(&self) -> &'a str {
        &self.descriptor.name
    }

    /// Full entry for an option, materializing its default if needed.
    pub async fn entry(&self, option: &str) -> Result<ValueEntry> {
        self.values.ensure_and_get(self.descriptor, option).await
    }

    /// Current value of an option as `T`.
    pub async fn get<T: DeserializeOwned>(&self, option: &str) -> Result<T> {
        let entry = self.entry(option).await?;
        serde_json::from_value(entry.value.to_json()).map_err(|err| {
            ConfigError::option_mismatch(
                &self.descriptor.name,
                option,
                format!(
                    "stored {} cannot be read as {}: {}",
                    entry.value.type_name(),
                    std::any::type_name::<T>(),
                    err
                ),
            )
        })
    }

    /// Stage a new value for an option. A value that serializes to `null`
    /// behaves like [`unset`](SectionView::unset).
    pub async fn set<T: Serialize + ?Sized>(&self, option: &str, value: &T) -> Result<ValueEntry> {
        let descriptor = self.descriptor.require_option(option)?;
        let value = descriptor.coerce(&self.descriptor.name, value)?;
        self.values.assign(self.descriptor, option, value).await
    }

    pub async fn set_nullable<T: Serialize>(&self, option: &str, value: Option<&T>) -> Result<ValueEntry> {
        match value {
            Some(value) => self.set(option, value).await,
            None => self.unset(option).await,
        }
    }

    pub async fn unset(&self, option: &str) -> Result<ValueEntry> {
        self.values.unset(self.descriptor, option).await
    }

    pub fn entry_blocking(&self, option: &str) -> Result<ValueEntry> {
        block_on(self.entry(option))?
    }

    pub fn get_blocking<T: DeserializeOwned>(&self, option: &str) -> Result<T> {
        block_on(self.get(option))?
    }

    pub fn set_blocking<T: Serialize + ?Sized>(&self, option: &str, value: &T) -> Result<ValueEntry> {
        block_on(self.set(option, value))?
    }

    pub fn set_nullable_blocking<T: Serialize>(&self, option: &str, value: Option<&T>) -> Result<ValueEntry> {
        block_on(self.set_nullable(option, value))?
    }

    pub fn unset_blocking(&self, option: &str) -> Result<ValueEntry> {
        block_on(self.unset(option))?
    }
}
