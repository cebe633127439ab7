//! Plugin registry.
//!
//! This module provides:
//! - [`PluginDescriptor`]: named, enable-flagged plugin definition
//! - [`PluginCatalog`]: the explicit target → factory table
//! - [`PluginRegistry`]: resolves names to live, cached plugin instances
//! - Capability traits ([`Extractor`], [`RetryingExtractor`], [`Transformer`], [`Loader`])
//!
//! A registry is owned by one orchestrator for one run; nothing is global.

pub mod catalog;
pub mod descriptor;
pub mod plugin;

pub use catalog::{parse_parameters, PluginCatalog, PluginFactory};
pub use descriptor::{PluginDescriptor, PluginTarget};
pub use plugin::{Capability, ExtractContext, Extractor, Loader, Plugin, RetryingExtractor, Transformer};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::PluginLoadError;

/// Resolves plugin names to configured instances.
///
/// Instances are created lazily on the first successful [`get`](Self::get)
/// and reused afterwards. The instance cache sits behind a mutex held across
/// instantiation, so concurrent first resolutions of one name build it once.
pub struct PluginRegistry {
    catalog: Arc<PluginCatalog>,
    descriptors: BTreeMap<String, PluginDescriptor>,
    instances: Mutex<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    /// Creates an empty registry resolving targets against `catalog`.
    pub fn new(catalog: Arc<PluginCatalog>) -> Self {
        Self {
            catalog,
            descriptors: BTreeMap::new(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an empty registry over the built-in catalog.
    pub fn with_builtin_catalog() -> Self {
        Self::new(Arc::new(PluginCatalog::builtin()))
    }

    /// The catalog used for target resolution.
    pub fn catalog(&self) -> &Arc<PluginCatalog> {
        &self.catalog
    }

    /// Stores or replaces a descriptor.
    ///
    /// Replacing a descriptor drops any cached instance for that name.
    /// Returns the previous descriptor, if any.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        descriptor: PluginDescriptor,
    ) -> Option<PluginDescriptor> {
        let name = name.into();
        self.evict(&name);
        debug!(
            plugin = %name,
            target = %descriptor.target,
            enabled = descriptor.enabled,
            "Registered plugin descriptor"
        );
        self.descriptors.insert(name, descriptor)
    }

    /// Registers every descriptor of a configuration's `plugins` table.
    pub fn load_from_config(&mut self, plugins: &BTreeMap<String, PluginDescriptor>) {
        for (name, descriptor) in plugins {
            self.register(name.clone(), descriptor.clone());
        }
        info!(
            registered = self.descriptors.len(),
            enabled = self.descriptors.values().filter(|d| d.enabled).count(),
            "Plugin descriptors loaded"
        );
    }

    /// Merges `parameters` into a registered descriptor.
    ///
    /// The cached instance is dropped so the next [`get`](Self::get) builds
    /// a fresh instance with the new parameters.
    pub fn configure(
        &mut self,
        name: &str,
        parameters: Map<String, Value>,
    ) -> Result<(), PluginLoadError> {
        let descriptor = self
            .descriptors
            .get_mut(name)
            .ok_or_else(|| PluginLoadError::Unknown(name.to_string()))?;
        descriptor.parameters.extend(parameters);
        self.evict(name);
        Ok(())
    }

    /// Resolves `name` to a live plugin instance.
    ///
    /// # Errors
    ///
    /// Returns `PluginLoadError` if the name is unknown, the descriptor is
    /// disabled, the target is not in the catalog, or the factory fails.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Plugin>, PluginLoadError> {
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| PluginLoadError::Unknown(name.to_string()))?;

        if !descriptor.enabled {
            return Err(PluginLoadError::Disabled(name.to_string()));
        }

        let mut instances = self.lock_instances();

        if let Some(instance) = instances.get(name) {
            return Ok(Arc::clone(instance));
        }

        let factory = self.catalog.resolve(&descriptor.target).ok_or_else(|| {
            PluginLoadError::UnresolvableTarget {
                name: name.to_string(),
                target: descriptor.target.to_string(),
            }
        })?;

        let instance: Arc<dyn Plugin> = Arc::from(factory(&descriptor.parameters).map_err(
            |reason| PluginLoadError::InstantiationFailed {
                name: name.to_string(),
                reason,
            },
        )?);

        info!(
            plugin = %name,
            target = %descriptor.target,
            capabilities = ?instance.capabilities(),
            "Loaded plugin"
        );

        instances.insert(name.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Looks up a descriptor without resolving it.
    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(name)
    }

    /// All descriptors, enabled or not, in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = (&String, &PluginDescriptor)> {
        self.descriptors.iter()
    }

    /// Returns true if `name` is registered and enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.descriptors.get(name).map(|d| d.enabled).unwrap_or(false)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn evict(&self, name: &str) {
        self.lock_instances().remove(name);
    }

    /// The cache is only written after a factory returns, so a panicking
    /// factory leaves it consistent and a poisoned lock is safe to reuse.
    fn lock_instances(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Plugin>>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("catalog", &self.catalog)
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::TransformationError;
    use crate::record::RecordSet;

    struct Echo {
        label: String,
    }

    impl Transformer for Echo {
        fn transform(&self, records: &RecordSet) -> Result<RecordSet, TransformationError> {
            Ok(records.clone())
        }
    }

    impl Plugin for Echo {
        fn name(&self) -> &str {
            &self.label
        }

        fn as_transformer(&self) -> Option<&dyn Transformer> {
            Some(self)
        }
    }

    fn counting_catalog(counter: Arc<AtomicUsize>) -> Arc<PluginCatalog> {
        let mut catalog = PluginCatalog::empty();
        catalog.register("tests", "Echo", move |params| {
            counter.fetch_add(1, Ordering::SeqCst);
            let label = params
                .get("label")
                .and_then(|v| v.as_str())
                .unwrap_or("echo")
                .to_string();
            Ok(Box::new(Echo { label }) as Box<dyn Plugin>)
        });
        catalog.register("tests", "Broken", |_| Err("boom".to_string()));
        catalog.register("tests", "Panics", |_| panic!("factory panicked"));
        Arc::new(catalog)
    }

    fn echo_descriptor() -> PluginDescriptor {
        PluginDescriptor::new(PluginTarget::new("tests", "Echo"))
    }

    #[test]
    fn test_get_unknown_plugin() {
        let registry = PluginRegistry::new(counting_catalog(Arc::default()));
        assert!(matches!(
            registry.get("x"),
            Err(PluginLoadError::Unknown(_))
        ));
    }

    #[test]
    fn test_disabled_plugin_is_visible_but_not_resolved() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new(counting_catalog(Arc::clone(&counter)));
        registry.register("x", echo_descriptor().with_enabled(false));

        assert!(registry.descriptor("x").is_some());
        assert!(!registry.is_enabled("x"));
        assert!(matches!(registry.get("x"), Err(PluginLoadError::Disabled(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_get_caches_instance() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new(counting_catalog(Arc::clone(&counter)));
        registry.register("x", echo_descriptor());

        let first = registry.get("x").unwrap();
        let second = registry.get("x").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(first.capabilities(), vec![Capability::Transform]);
    }

    #[test]
    fn test_re_register_enables_and_evicts() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new(counting_catalog(Arc::clone(&counter)));
        registry.register("x", echo_descriptor().with_enabled(false));
        assert!(registry.get("x").is_err());

        let previous = registry.register("x", echo_descriptor());
        assert!(previous.is_some());
        let first = registry.get("x").unwrap();

        registry.register("x", echo_descriptor());
        let second = registry.get("x").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unresolvable_target() {
        let mut registry = PluginRegistry::new(counting_catalog(Arc::default()));
        registry.register(
            "ghost",
            PluginDescriptor::new(PluginTarget::new("nowhere", "Nothing")),
        );
        let err = registry.get("ghost").err().unwrap();
        assert!(matches!(err, PluginLoadError::UnresolvableTarget { .. }));
        assert!(err.to_string().contains("nowhere::Nothing"));
    }

    #[test]
    fn test_instantiation_failure() {
        let mut registry = PluginRegistry::new(counting_catalog(Arc::default()));
        registry.register(
            "broken",
            PluginDescriptor::new(PluginTarget::new("tests", "Broken")),
        );
        let err = registry.get("broken").err().unwrap();
        assert!(matches!(err, PluginLoadError::InstantiationFailed { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_configure_rebuilds_with_new_parameters() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new(counting_catalog(Arc::clone(&counter)));
        registry.register("x", echo_descriptor());
        assert_eq!(registry.get("x").unwrap().name(), "echo");

        let mut params = Map::new();
        params.insert("label".to_string(), Value::String("renamed".to_string()));
        registry.configure("x", params).unwrap();

        assert_eq!(registry.get("x").unwrap().name(), "renamed");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(registry.configure("missing", Map::new()).is_err());
    }

    #[test]
    fn test_concurrent_first_resolution_instantiates_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new(counting_catalog(Arc::clone(&counter)));
        registry.register("x", echo_descriptor());

        let instances: Vec<Arc<dyn Plugin>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.get("x").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_registry_usable_after_factory_panic() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = PluginRegistry::new(counting_catalog(Arc::clone(&counter)));
        registry.register("x", echo_descriptor());
        registry.register(
            "bad",
            PluginDescriptor::new(PluginTarget::new("tests", "Panics")),
        );
        let first = registry.get("x").unwrap();

        let panicked =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| registry.get("bad")));
        assert!(panicked.is_err());

        // Cached instance still served, and re-registering still evicts it.
        assert!(Arc::ptr_eq(&first, &registry.get("x").unwrap()));
        registry.register("x", echo_descriptor());
        let second = registry.get("x").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
