//! Section and option descriptors.
//!
//! Descriptors are static schema: they say which options a section has,
//! their types and defaults. They are never persisted as configuration state.

use crate::error::{ConfigError, Result};
use crate::value::{ConfigValue, OptionType};
use serde::Serialize;
use uuid::Uuid;

/// One configurable option within a section.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescriptor {
    /// Option key (must be unique within its section)
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub option_type: OptionType,
    /// Value materialized on first access
    pub default: ConfigValue,
    /// Value written when a string option is cleared
    pub unset: Option<ConfigValue>,
    /// Hidden from user-facing listings
    pub private: bool,
}

impl OptionDescriptor {
    fn new(name: impl Into<String>, option_type: OptionType, default: ConfigValue) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: None,
            option_type,
            default,
            unset: None,
            private: false,
        }
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, OptionType::Bool, ConfigValue::Bool(default))
    }

    pub fn integer(name: impl Into<String>, default: i64) -> Self {
        Self::new(name, OptionType::Integer, ConfigValue::Integer(default))
    }

    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::new(name, OptionType::Float, ConfigValue::Float(default))
    }

    /// String option. Clearing it writes `""` unless [`with_unset`] says otherwise.
    ///
    /// [`with_unset`]: OptionDescriptor::with_unset
    pub fn string(name: impl Into<String>, default: impl Into<String>) -> Self {
        let mut option = Self::new(name, OptionType::String, ConfigValue::String(default.into()));
        option.unset = Some(ConfigValue::String(String::new()));
        option
    }

    /// Selection among `choices`; `default` must be one of them.
    pub fn selection(name: impl Into<String>, choices: &[&str], default: &str) -> Self {
        debug_assert!(choices.contains(&default), "default must be a declared choice");
        Self::new(
            name,
            OptionType::Selection(choices.iter().map(|c| c.to_string()).collect()),
            ConfigValue::Selection(default.to_string()),
        )
    }

    /// Resource handle; defaults to the nil UUID.
    pub fn resource(name: impl Into<String>) -> Self {
        Self::new(name, OptionType::Resource, ConfigValue::Resource(Uuid::nil()))
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the sentinel written when this string option is cleared.
    pub fn with_unset(mut self, unset: impl Into<String>) -> Self {
        if self.is_string() {
            self.unset = Some(ConfigValue::String(unset.into()));
        }
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn is_string(&self) -> bool {
        self.option_type == OptionType::String
    }

    /// Check a stored value against the declared type.
    pub fn check(&self, section: &str, value: &ConfigValue) -> Result<()> {
        if self.option_type.accepts(value) {
            Ok(())
        } else {
            Err(ConfigError::option_mismatch(
                section,
                &self.name,
                format!("expected {}, got {}", self.option_type.name(), value),
            ))
        }
    }

    /// Convert a caller value into a stored value of this option's type.
    ///
    /// A value that serializes to JSON `null` converts to `None`. NaN and
    /// infinite floats are rejected.
    pub fn coerce<T: Serialize + ?Sized>(&self, section: &str, value: &T) -> Result<Option<ConfigValue>> {
        let json = snowflake_kv::to_json(value)
            .map_err(|err| ConfigError::option_mismatch(section, &self.name, err))?;
        if json.is_null() {
            return Ok(None);
        }
        self.option_type
            .value_from_json(&json)
            .map(Some)
            .map_err(|reason| ConfigError::option_mismatch(section, &self.name, reason))
    }
}

/// A named group of related options.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    options: Vec<OptionDescriptor>,
}

impl SectionDescriptor {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: None,
            options: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add an option. A later option with the same name replaces the earlier one.
    pub fn with_option(mut self, option: OptionDescriptor) -> Self {
        self.options.retain(|o| o.name != option.name);
        self.options.push(option);
        self
    }

    pub fn option(&self, name: &str) -> Option<&OptionDescriptor> {
        self.options.iter().find(|o| o.name == name)
    }

    pub(crate) fn require_option(&self, name: &str) -> Result<&OptionDescriptor> {
        self.option(name).ok_or_else(|| ConfigError::UnknownOption {
            section: self.name.clone(),
            option: name.to_string(),
        })
    }

    pub fn options(&self) -> &[OptionDescriptor] {
        &self.options
    }
}

/// Every section of one configuration schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDescriptor {
    /// Recorded with each collection; loading under another schema fails.
    pub schema_name: String,
    sections: Vec<SectionDescriptor>,
}

impl CollectionDescriptor {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            sections: Vec::new(),
        }
    }

    pub fn with_section(mut self, section: SectionDescriptor) -> Self {
        self.sections.retain(|s| s.name != section.name);
        self.sections.push(section);
        self
    }

    pub fn section(&self, name: &str) -> Option<&SectionDescriptor> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn sections(&self) -> &[SectionDescriptor] {
        &self.sections
    }

    /// Option descriptor for a stored (section, option) pair, if declared.
    pub fn option(&self, section: &str, option: &str) -> Option<&OptionDescriptor> {
        self.section(section).and_then(|s| s.option(option))
    }
}

/// A configuration schema type.
///
/// Stands in for generated accessor code: implementors hand out one
/// descriptor, built once and reused for every collection of the schema.
///
/// ```rust,ignore
/// struct DisplaySettings;
///
/// impl ConfigurationSchema for DisplaySettings {
///     fn descriptor() -> &'static CollectionDescriptor {
///         static DESCRIPTOR: OnceLock<CollectionDescriptor> = OnceLock::new();
///         DESCRIPTOR.get_or_init(|| {
///             CollectionDescriptor::new("display").with_section(
///                 SectionDescriptor::new("video", "Video")
///                     .with_option(OptionDescriptor::bool("fullscreen", true)),
///             )
///         })
///     }
/// }
/// ```
pub trait ConfigurationSchema: 'static {
    fn descriptor() -> &'static CollectionDescriptor;
}
