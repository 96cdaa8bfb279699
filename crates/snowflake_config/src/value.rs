//! Option types and the persisted value representation.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use uuid::Uuid;

/// Declared type of a configuration option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionType {
    Bool,
    Integer,
    Float,
    String,
    /// One of a fixed set of serialized names (typically a Rust enum).
    Selection(Vec<String>),
    /// Handle to an external resource.
    Resource,
}

impl OptionType {
    pub fn name(&self) -> &'static str {
        match self {
            OptionType::Bool => "bool",
            OptionType::Integer => "integer",
            OptionType::Float => "float",
            OptionType::String => "string",
            OptionType::Selection(_) => "selection",
            OptionType::Resource => "resource",
        }
    }

    /// Whether `value` is a legal value for this type.
    pub fn accepts(&self, value: &ConfigValue) -> bool {
        match (self, value) {
            (OptionType::Float, ConfigValue::Float(v)) => v.is_finite(),
            (OptionType::Bool, ConfigValue::Bool(_))
            | (OptionType::Integer, ConfigValue::Integer(_))
            | (OptionType::String, ConfigValue::String(_))
            | (OptionType::Resource, ConfigValue::Resource(_)) => true,
            (OptionType::Selection(choices), ConfigValue::Selection(choice)) => {
                choices.iter().any(|c| c == choice)
            }
            _ => false,
        }
    }

    /// Convert an untyped JSON value into a value of this type.
    ///
    /// Integers are accepted where floats are declared; nothing else is
    /// coerced.
    pub fn value_from_json(&self, json: &Json) -> Result<ConfigValue, String> {
        let value = match self {
            OptionType::Bool => json.as_bool().map(ConfigValue::Bool),
            OptionType::Integer => json.as_i64().map(ConfigValue::Integer),
            OptionType::Float => json.as_f64().map(ConfigValue::Float),
            OptionType::String => json.as_str().map(|s| ConfigValue::String(s.to_string())),
            OptionType::Selection(choices) => {
                let choice = json
                    .as_str()
                    .ok_or_else(|| format!("expected selection name, got {}", json))?;
                if !choices.iter().any(|c| c == choice) {
                    return Err(format!(
                        "'{}' is not one of [{}]",
                        choice,
                        choices.join(", ")
                    ));
                }
                Some(ConfigValue::Selection(choice.to_string()))
            }
            OptionType::Resource => json
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(ConfigValue::Resource),
        };
        value.ok_or_else(|| format!("expected {}, got {}", self.name(), json))
    }
}

/// A stored option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Selection(String),
    Resource(Uuid),
}

impl ConfigValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::Selection(_) => "selection",
            ConfigValue::Resource(_) => "resource",
        }
    }

    /// Whether the value can be stored at all. NaN and infinite floats
    /// cannot.
    pub fn is_storable(&self) -> bool {
        match self {
            ConfigValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }

    pub fn same_kind(&self, other: &ConfigValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Untyped JSON form, suitable for deserializing into caller types.
    pub fn to_json(&self) -> Json {
        match self {
            ConfigValue::Bool(v) => Json::Bool(*v),
            ConfigValue::Integer(v) => Json::from(*v),
            ConfigValue::Float(v) => Json::from(*v),
            ConfigValue::String(v) | ConfigValue::Selection(v) => Json::String(v.clone()),
            ConfigValue::Resource(v) => Json::String(v.hyphenated().to_string()),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Integer(v) => write!(f, "{}", v),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::String(v) => write!(f, "{:?}", v),
            ConfigValue::Selection(v) => write!(f, "{}", v),
            ConfigValue::Resource(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Integer(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

impl From<Uuid> for ConfigValue {
    fn from(v: Uuid) -> Self {
        ConfigValue::Resource(v)
    }
}
