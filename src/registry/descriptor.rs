//! Plugin descriptors: what to load and how to initialise it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Locator of a plugin implementation: a module path plus an entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginTarget {
    pub module: String,
    pub entry_point: String,
}

impl PluginTarget {
    pub fn new(module: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            entry_point: entry_point.into(),
        }
    }
}

impl fmt::Display for PluginTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.entry_point)
    }
}

/// Named, enable-flagged definition of a plugin and its parameters.
///
/// Serialised as `{"module": ..., "class": ..., "enabled": ..., <parameters>}`;
/// every key other than the three reserved ones is a plugin parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDescriptor", into = "RawDescriptor")]
pub struct PluginDescriptor {
    pub target: PluginTarget,
    pub enabled: bool,
    pub parameters: Map<String, Value>,
}

impl PluginDescriptor {
    /// Creates an enabled descriptor with no parameters.
    pub fn new(target: PluginTarget) -> Self {
        Self {
            target,
            enabled: true,
            parameters: Map::new(),
        }
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Adds a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

#[derive(Serialize, Deserialize)]
struct RawDescriptor {
    module: String,
    #[serde(alias = "entry_point")]
    class: String,
    #[serde(default)]
    enabled: bool,
    #[serde(flatten)]
    parameters: Map<String, Value>,
}

impl From<RawDescriptor> for PluginDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        let mut parameters = raw.parameters;
        // An explicit "parameters" object is merged with the inline keys.
        if let Some(Value::Object(nested)) = parameters.remove("parameters") {
            for (key, value) in nested {
                parameters.entry(key).or_insert(value);
            }
        }
        Self {
            target: PluginTarget::new(raw.module, raw.class),
            enabled: raw.enabled,
            parameters,
        }
    }
}

impl From<PluginDescriptor> for RawDescriptor {
    fn from(descriptor: PluginDescriptor) -> Self {
        Self {
            module: descriptor.target.module,
            class: descriptor.target.entry_point,
            enabled: descriptor.enabled,
            parameters: descriptor.parameters,
        }
    }
}
