//! Explicit table of plugin targets the registry can instantiate.
//!
//! There is no scanning: a target resolves only if a factory was registered
//! for exactly that `module::entry_point` pair.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::plugins;

use super::descriptor::PluginTarget;
use super::plugin::Plugin;

/// Builds and configures a plugin instance from descriptor parameters.
pub type PluginFactory =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Box<dyn Plugin>, String> + Send + Sync>;

/// Mapping of plugin targets to factories.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<PluginTarget, PluginFactory>,
}

impl PluginCatalog {
    /// Creates an empty catalog.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with every plugin shipped in this crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        plugins::register_builtin(&mut catalog);
        catalog
    }

    /// Registers a factory for `module::entry_point`, replacing any previous one.
    pub fn register<F>(&mut self, module: &str, entry_point: &str, factory: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Box<dyn Plugin>, String> + Send + Sync + 'static,
    {
        self.factories
            .insert(PluginTarget::new(module, entry_point), Arc::new(factory));
    }

    /// Looks up the factory for a target.
    pub fn resolve(&self, target: &PluginTarget) -> Option<PluginFactory> {
        self.factories.get(target).cloned()
    }

    /// Returns true if the target is known.
    pub fn contains(&self, target: &PluginTarget) -> bool {
        self.factories.contains_key(target)
    }

    /// Known targets, sorted for display.
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.factories.keys().map(|t| t.to_string()).collect();
        targets.sort();
        targets
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("targets", &self.targets())
            .finish()
    }
}

/// Deserialises plugin parameters into a settings struct.
pub fn parse_parameters<T: serde::de::DeserializeOwned>(
    parameters: &Map<String, Value>,
) -> Result<T, String> {
    serde_json::from_value(Value::Object(parameters.clone()))
        .map_err(|e| format!("invalid plugin parameters: {}", e))
}
