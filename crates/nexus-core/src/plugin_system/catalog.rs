use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::plugin_system::descriptor::PluginDescriptor;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::traits::{Plugin, PluginError};

/// Constructor registered for one entry point
pub type PluginFactory = Arc<dyn Fn(&PluginDescriptor) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync>;

/// Statically registered plugin constructors, keyed by entry point
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; a later registration for the same entry point replaces the earlier one
    pub fn register<F>(&mut self, entry_point: &str, factory: F) -> &mut Self
    where
        F: Fn(&PluginDescriptor) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        if self.factories.insert(entry_point.to_string(), Arc::new(factory)).is_some() {
            log::warn!("Entry point '{}' registered twice; keeping the latest factory", entry_point);
        }
        self
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.contains_key(entry_point)
    }

    pub fn entry_points(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the plugin named by a descriptor's entry point
    pub fn instantiate(&self, descriptor: &PluginDescriptor) -> Result<Arc<dyn Plugin>, PluginSystemError> {
        let factory = self
            .factories
            .get(&descriptor.entry_point)
            .ok_or_else(|| PluginSystemError::UnknownEntryPoint {
                plugin_id: descriptor.id.clone(),
                entry_point: descriptor.entry_point.clone(),
            })?;

        match catch_unwind(AssertUnwindSafe(|| factory(descriptor))) {
            Ok(Ok(plugin)) => Ok(plugin),
            Ok(Err(e)) => Err(PluginSystemError::LoadError {
                plugin_id: descriptor.id.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(PluginSystemError::LoadError {
                plugin_id: descriptor.id.clone(),
                message: "plugin constructor panicked".to_string(),
            }),
        }
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog").field("entry_points", &self.entry_points()).finish()
    }
}
