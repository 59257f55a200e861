use std::collections::BTreeMap;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::event::{BusStats, EventBus, SubscriptionId, SystemEvent};
use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;
use crate::plugin_system::cache::{CacheStats, ResolutionCache};
use crate::plugin_system::catalog::PluginCatalog;
use crate::plugin_system::descriptor::PluginDescriptor;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::registry::{FailureKind, PluginFailure, PluginRegistry, PluginSnapshot, PluginState};
use crate::plugin_system::traits::{Plugin, PluginContext};

/// Result type for plugin manager operations
pub type PluginResult<T> = std::result::Result<T, PluginSystemError>;

/// Outcome of a `load_all` pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Resolved load order of the whole set
    pub order: Vec<String>,
    pub active: Vec<String>,
    /// Disabled by configuration
    pub skipped: Vec<String>,
    /// Plugins left in Error, with the reason
    pub failed: Vec<(String, String)>,
}

/// Aggregate health of the plugin set
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    pub total: usize,
    pub counts: BTreeMap<PluginState, usize>,
    pub recent_errors: Vec<PluginFailure>,
    pub cache: CacheStats,
    pub bus: BusStats,
}

impl PluginStatus {
    pub fn count(&self, state: PluginState) -> usize {
        self.counts.get(&state).copied().unwrap_or(0)
    }
}

/// Plugin system component interface
#[async_trait]
pub trait PluginManager: KernelComponent {
    /// Resolve the set and activate every enabled plugin in dependency order
    async fn load_all(&self, descriptors: Vec<PluginDescriptor>) -> PluginResult<LoadReport>;

    /// Activate one known plugin whose dependencies are Active
    async fn enable(&self, id: &str) -> PluginResult<()>;

    /// Tear down one plugin; its dependents are left running
    async fn disable(&self, id: &str) -> PluginResult<()>;

    /// Tear down and re-activate one plugin, optionally with a new descriptor
    async fn reload(&self, id: &str, replacement: Option<PluginDescriptor>) -> PluginResult<()>;

    /// Tear down everything live in reverse load order
    async fn disable_all(&self) -> usize;

    async fn snapshot(&self) -> Vec<PluginSnapshot>;

    async fn status(&self) -> PluginStatus;

    async fn load_order(&self) -> Vec<String>;

    async fn instance_state(&self, id: &str) -> Option<PluginState>;
}

/// Default implementation of plugin manager
#[derive(Clone)]
pub struct DefaultPluginManager {
    name: &'static str,
    bus: EventBus,
    catalog: Arc<PluginCatalog>,
    cache: Arc<ResolutionCache>,
    registry: Arc<Mutex<PluginRegistry>>,
    fault_task: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl DefaultPluginManager {
    pub fn new(bus: EventBus, catalog: PluginCatalog, cache: Arc<ResolutionCache>) -> Self {
        Self {
            name: "DefaultPluginManager",
            bus,
            catalog: Arc::new(catalog),
            cache,
            registry: Arc::new(Mutex::new(PluginRegistry::new())),
            fault_task: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// Get reference to the plugin registry Arc<Mutex>
    pub fn registry(&self) -> &Arc<Mutex<PluginRegistry>> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn emit(&self, event: SystemEvent) {
        emit(&self.bus, event);
    }

    fn record_error(&self, registry: &mut PluginRegistry, descriptor: &PluginDescriptor, kind: FailureKind, message: &str) {
        let failure = registry.mark_error(descriptor, kind, message);
        log::error!("{}", failure);
        self.emit(SystemEvent::PluginError {
            plugin_id: descriptor.id.clone(),
            kind: kind.as_str().to_string(),
            message: message.to_string(),
        });
    }

    /// Construct and initialize a plugin; on failure nothing it subscribed survives
    async fn instantiate(&self, descriptor: &PluginDescriptor) -> PluginResult<(Arc<dyn Plugin>, Vec<SubscriptionId>)> {
        let plugin = self.catalog.instantiate(descriptor)?;
        let mut ctx = PluginContext::new(descriptor.clone(), self.bus.clone(), plugin.clone());

        let outcome = AssertUnwindSafe(plugin.init(&mut ctx)).catch_unwind().await;
        let message = match outcome {
            Ok(Ok(())) => return Ok((plugin, ctx.into_subscriptions())),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "plugin init panicked".to_string(),
        };
        for id in ctx.subscriptions() {
            let _ = self.bus.unsubscribe(*id);
        }
        Err(PluginSystemError::LoadError {
            plugin_id: descriptor.id.clone(),
            message,
        })
    }

    /// Activate one plugin. Caller holds the registry lock.
    async fn activate_locked(&self, registry: &mut PluginRegistry, descriptor: &PluginDescriptor) -> PluginResult<()> {
        for dep in &descriptor.dependencies {
            let state = registry.state_of(dep);
            if state != PluginState::Active {
                let message = format!("dependency failed: '{}' is {}", dep, state);
                self.record_error(registry, descriptor, FailureKind::DependencyFailed, &message);
                return Err(PluginSystemError::DependencyNotActive {
                    plugin_id: descriptor.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        log::debug!("Loading plugin {}", descriptor);
        registry.begin_loading(descriptor);
        match self.instantiate(descriptor).await {
            Ok((plugin, subscriptions)) => {
                log::info!(
                    "Plugin {} active ({}) with {} subscription(s)",
                    descriptor,
                    plugin.name(),
                    subscriptions.len()
                );
                registry.activate(&descriptor.id, plugin, subscriptions);
                self.emit(SystemEvent::PluginLoaded {
                    plugin_id: descriptor.id.clone(),
                    version: descriptor.version.clone(),
                });
                Ok(())
            }
            Err(e) => {
                let message = match &e {
                    PluginSystemError::LoadError { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                self.record_error(registry, descriptor, FailureKind::Load, &message);
                Err(e)
            }
        }
    }

    /// Remove a plugin's instance, shutting it down first if it was live.
    /// Caller holds the registry lock. Returns false when nothing was live.
    async fn deactivate_locked(&self, registry: &mut PluginRegistry, id: &str) -> bool {
        let dependents = registry.active_dependents(id);
        let Some((previous, plugin)) = registry.begin_unloading(id) else {
            return false;
        };
        if previous == PluginState::Active && !dependents.is_empty() {
            log::warn!("Disabling '{}' while dependents are active: {}", id, dependents.join(", "));
        }

        match self.bus.unsubscribe_owner(id) {
            Ok(removed) => log::debug!("Removed {} subscription(s) of '{}'", removed, id),
            Err(e) => log::warn!("Could not remove subscriptions of '{}': {}", id, e),
        }

        if let Some(plugin) = plugin {
            let outcome = AssertUnwindSafe(plugin.shutdown()).catch_unwind().await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("plugin shutdown panicked".to_string()),
            };
            if let Some(message) = failure {
                let failure = PluginFailure::new(id, FailureKind::Shutdown, message);
                log::error!("{}", failure);
                registry.push_recent(failure);
            }
        }

        registry.remove_instance(id);
        if previous == PluginState::Active {
            log::info!("Plugin '{}' unloaded", id);
            self.emit(SystemEvent::PluginUnloaded { plugin_id: id.to_string() });
        }
        true
    }

    async fn disable_all_locked(&self, registry: &mut PluginRegistry) -> usize {
        let mut count = 0;
        for id in registry.live_in_reverse_order() {
            if self.deactivate_locked(registry, &id).await {
                count += 1;
            }
        }
        count
    }

    /// Spawn the task turning bus handler faults into recorded plugin errors
    fn spawn_fault_recorder(&self) {
        let mut slot = match self.fault_task.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return;
        }
        let Some(mut faults) = self.bus.take_fault_receiver() else {
            log::warn!("Handler fault channel already taken; handler errors will not be recorded");
            return;
        };
        let registry = self.registry.clone();
        let bus = self.bus.clone();
        *slot = Some(tokio::spawn(async move {
            while let Some(fault) = faults.recv().await {
                let recorded = registry.lock().await.record_handler_fault(&fault);
                match recorded {
                    Some(failure) => {
                        log::error!("{}", failure);
                        emit(
                            &bus,
                            SystemEvent::PluginError {
                                plugin_id: failure.plugin_id,
                                kind: failure.kind.as_str().to_string(),
                                message: failure.message,
                            },
                        );
                    }
                    None => log::warn!("Unattributed {}", fault),
                }
            }
        }));
    }
}

/// Publish a core event; a full queue or stopped bus only costs the notification
fn emit(bus: &EventBus, event: SystemEvent) {
    let topic = event.topic();
    if let Err(e) = bus.publish(topic, event.payload()) {
        log::warn!("Could not publish '{}': {}", topic, e);
    }
}

impl Debug for DefaultPluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultPluginManager")
            .field("name", &self.name)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KernelComponent for DefaultPluginManager {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn start(&self) -> Result<()> {
        self.spawn_fault_recorder();
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let stopped = self.disable_all().await;
        log::info!("Plugin manager stopped {} plugin(s)", stopped);
        Ok(())
    }
}

#[async_trait]
impl PluginManager for DefaultPluginManager {
    async fn load_all(&self, descriptors: Vec<PluginDescriptor>) -> PluginResult<LoadReport> {
        // Resolve before touching anything so a bad set leaves the current one running
        let order = self.cache.get_or_resolve(&descriptors)?;

        let mut registry = self.registry.lock().await;
        let replaced = self.disable_all_locked(&mut registry).await;
        if replaced > 0 {
            log::info!("Tore down {} plugin(s) before reloading the set", replaced);
        }
        registry.set_descriptors(descriptors, order.clone());

        let mut report = LoadReport {
            order: order.clone(),
            ..LoadReport::default()
        };
        for descriptor in registry.descriptors_in_order() {
            if !descriptor.enabled {
                log::debug!("Plugin {} is disabled; skipping", descriptor);
                report.skipped.push(descriptor.id.clone());
                continue;
            }
            match self.activate_locked(&mut registry, &descriptor).await {
                Ok(()) => report.active.push(descriptor.id.clone()),
                Err(e) => report.failed.push((descriptor.id.clone(), e.to_string())),
            }
        }

        log::info!(
            "Loaded plugin set: {} active, {} skipped, {} failed",
            report.active.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn enable(&self, id: &str) -> PluginResult<()> {
        let mut registry = self.registry.lock().await;
        let descriptor = registry
            .descriptor(id)
            .cloned()
            .ok_or_else(|| PluginSystemError::PluginNotFound(id.to_string()))?;
        registry.set_enabled(id, true);
        match registry.state_of(id) {
            PluginState::Active => return Ok(()),
            PluginState::Unloaded => {}
            _ => {
                // Clear a failed or stuck instance before retrying
                self.deactivate_locked(&mut registry, id).await;
            }
        }
        let descriptor = PluginDescriptor { enabled: true, ..descriptor };
        self.activate_locked(&mut registry, &descriptor).await
    }

    async fn disable(&self, id: &str) -> PluginResult<()> {
        let mut registry = self.registry.lock().await;
        if !registry.has_plugin(id) {
            return Err(PluginSystemError::PluginNotFound(id.to_string()));
        }
        registry.set_enabled(id, false);
        if !self.deactivate_locked(&mut registry, id).await {
            log::debug!("Plugin '{}' was not loaded", id);
        }
        Ok(())
    }

    async fn reload(&self, id: &str, replacement: Option<PluginDescriptor>) -> PluginResult<()> {
        let mut registry = self.registry.lock().await;
        let current = registry
            .descriptor(id)
            .cloned()
            .ok_or_else(|| PluginSystemError::PluginNotFound(id.to_string()))?;
        let next = replacement.unwrap_or_else(|| current.clone());
        if next.id != id {
            return Err(PluginSystemError::InternalError(format!(
                "replacement descriptor '{}' does not match plugin '{}'",
                next.id, id
            )));
        }

        // Validate the new set before tearing anything down
        let old_set = registry.descriptors_in_order();
        let new_set: Vec<PluginDescriptor> = old_set
            .iter()
            .map(|d| if d.id == id { next.clone() } else { d.clone() })
            .collect();
        let order = self.cache.get_or_resolve(&new_set)?;
        for dep in &next.dependencies {
            if registry.state_of(dep) != PluginState::Active {
                return Err(PluginSystemError::DependencyNotActive {
                    plugin_id: id.to_string(),
                    dependency: dep.clone(),
                });
            }
        }

        if current.fingerprint() != next.fingerprint() {
            self.cache.invalidate_set(&old_set);
        }
        registry.set_descriptors(new_set, order);

        log::info!("Reloading plugin {}", next);
        self.deactivate_locked(&mut registry, id).await;
        if !next.enabled {
            return Ok(());
        }
        self.activate_locked(&mut registry, &next).await
    }

    async fn disable_all(&self) -> usize {
        let mut registry = self.registry.lock().await;
        self.disable_all_locked(&mut registry).await
    }

    async fn snapshot(&self) -> Vec<PluginSnapshot> {
        self.registry.lock().await.snapshot()
    }

    async fn status(&self) -> PluginStatus {
        let registry = self.registry.lock().await;
        PluginStatus {
            total: registry.len(),
            counts: registry.counts_by_state(),
            recent_errors: registry.recent_errors(),
            cache: self.cache.stats(),
            bus: self.bus.stats(),
        }
    }

    async fn load_order(&self) -> Vec<String> {
        self.registry.lock().await.load_order().to_vec()
    }

    async fn instance_state(&self, id: &str) -> Option<PluginState> {
        let registry = self.registry.lock().await;
        registry.has_plugin(id).then(|| registry.state_of(id))
    }
}
