//! Flat, read-only per-behavior configuration.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Immutable key/value record a behavior is constructed from.
///
/// Getters with a default never fail; the `require_*` getters return
/// [`CoreError`] for a missing or mistyped key.
///
/// ```
/// use botcore_types::BehaviorConfig;
///
/// let cfg = BehaviorConfig::default()
///     .with("min_stack_height", 2)
///     .with("success_animation", "celebrate");
///
/// assert_eq!(cfg.u32_or("min_stack_height", 3), 2);
/// assert_eq!(cfg.u32_or("max_retries", 2), 2);
/// assert_eq!(cfg.str_or("success_animation", "none"), "celebrate");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BehaviorConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl BehaviorConfig {
    /// Builder-style insert, used when assembling configs in code.
    pub fn with(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn f32_or(&self, key: &str, default: f32) -> f32 {
        match self.values.get(key) {
            Some(ConfigValue::Float(v)) => *v as f32,
            Some(ConfigValue::Int(v)) => *v as f32,
            _ => default,
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> u32 {
        match self.values.get(key) {
            Some(ConfigValue::Int(v)) => u32::try_from(*v).unwrap_or(default),
            _ => default,
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(ConfigValue::Bool(v)) => *v,
            _ => default,
        }
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.values.get(key) {
            Some(ConfigValue::Text(v)) => v,
            _ => default,
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str, CoreError> {
        match self.values.get(key) {
            Some(ConfigValue::Text(v)) => Ok(v),
            Some(_) => Err(CoreError::ConfigType {
                key: key.to_string(),
                expected: "text",
            }),
            None => Err(CoreError::MissingConfigKey(key.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int(v.into())
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        ConfigValue::Int(v.into())
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<f32> for ConfigValue {
    fn from(v: f32) -> Self {
        ConfigValue::Float(v.into())
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Text(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Text(v)
    }
}
