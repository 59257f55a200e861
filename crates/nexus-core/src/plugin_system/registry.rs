use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

use crate::event::{HandlerFault, SubscriptionId};
use crate::kernel::constants::RECENT_ERRORS_LIMIT;
use crate::plugin_system::descriptor::PluginDescriptor;
use crate::plugin_system::traits::Plugin;

/// Runtime state of a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PluginState {
    Unloaded,
    Loading,
    Active,
    Error,
    Unloading,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginState::Unloaded => "Unloaded",
            PluginState::Loading => "Loading",
            PluginState::Active => "Active",
            PluginState::Error => "Error",
            PluginState::Unloading => "Unloading",
        };
        f.write_str(s)
    }
}

/// What went wrong for a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Load,
    DependencyFailed,
    Handler,
    Shutdown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Load => "load",
            FailureKind::DependencyFailed => "dependency_failed",
            FailureKind::Handler => "handler",
            FailureKind::Shutdown => "shutdown",
        }
    }
}

/// One recorded plugin failure
#[derive(Debug, Clone, Serialize)]
pub struct PluginFailure {
    pub plugin_id: String,
    pub kind: FailureKind,
    pub message: String,
    pub at: SystemTime,
}

impl PluginFailure {
    pub fn new(plugin_id: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            kind,
            message: message.into(),
            at: SystemTime::now(),
        }
    }
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.plugin_id, self.message)
    }
}

/// A plugin that is loading, live, failed or being torn down.
///
/// Instances only exist between activation and teardown; a known descriptor
/// without an instance is Unloaded.
pub struct PluginInstance {
    descriptor: PluginDescriptor,
    state: PluginState,
    plugin: Option<Arc<dyn Plugin>>,
    subscriptions: Vec<SubscriptionId>,
    last_error: Option<PluginFailure>,
    handler_errors: u64,
}

impl PluginInstance {
    pub(crate) fn loading(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            state: PluginState::Loading,
            plugin: None,
            subscriptions: Vec::new(),
            last_error: None,
            handler_errors: 0,
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn subscriptions(&self) -> &[SubscriptionId] {
        &self.subscriptions
    }

    pub fn last_error(&self) -> Option<&PluginFailure> {
        self.last_error.as_ref()
    }

    /// Handler faults recorded while this instance was live
    pub fn handler_errors(&self) -> u64 {
        self.handler_errors
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.descriptor.id)
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions)
            .field("last_error", &self.last_error)
            .field("handler_errors", &self.handler_errors)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of one plugin, as returned by `list_addons`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSnapshot {
    pub id: String,
    pub version: String,
    pub state: PluginState,
    pub enabled: bool,
    pub priority: i32,
    pub dependencies: Vec<String>,
    pub subscriptions: usize,
    pub handler_errors: u64,
    pub last_error: Option<String>,
}

/// Descriptors, resolved order and live instances.
///
/// Only the plugin manager mutates this, always under its lock.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    descriptors: HashMap<String, PluginDescriptor>,
    load_order: Vec<String>,
    instances: HashMap<String, PluginInstance>,
    recent_errors: VecDeque<PluginFailure>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the known descriptor set; live instances are kept
    pub(crate) fn set_descriptors(&mut self, descriptors: Vec<PluginDescriptor>, load_order: Vec<String>) {
        self.descriptors = descriptors.into_iter().map(|d| (d.id.clone(), d)).collect();
        self.load_order = load_order;
    }

    pub fn descriptor(&self, id: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(id)
    }

    pub fn has_plugin(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    pub(crate) fn set_enabled(&mut self, id: &str, enabled: bool) {
        if let Some(descriptor) = self.descriptors.get_mut(id) {
            descriptor.enabled = enabled;
        }
    }

    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }

    /// Descriptors in resolved load order
    pub fn descriptors_in_order(&self) -> Vec<PluginDescriptor> {
        self.load_order
            .iter()
            .filter_map(|id| self.descriptors.get(id).cloned())
            .collect()
    }

    pub fn state_of(&self, id: &str) -> PluginState {
        self.instances
            .get(id)
            .map(|i| i.state)
            .unwrap_or(PluginState::Unloaded)
    }

    pub fn instance(&self, id: &str) -> Option<&PluginInstance> {
        self.instances.get(id)
    }

    /// Ids of Active plugins that depend directly on `id`
    pub fn active_dependents(&self, id: &str) -> Vec<String> {
        self.load_order
            .iter()
            .filter(|other| self.state_of(other) == PluginState::Active)
            .filter(|other| {
                self.descriptors
                    .get(other.as_str())
                    .is_some_and(|d| d.dependencies.contains(id))
            })
            .cloned()
            .collect()
    }

    /// Ids with a live or failed instance, in reverse load order
    pub fn live_in_reverse_order(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .load_order
            .iter()
            .rev()
            .filter(|id| self.instances.contains_key(id.as_str()))
            .cloned()
            .collect();
        // Instances whose descriptor was replaced out of the order go last
        let mut orphans: Vec<String> = self
            .instances
            .keys()
            .filter(|id| !self.load_order.contains(*id))
            .cloned()
            .collect();
        orphans.sort();
        ids.extend(orphans);
        ids
    }

    pub(crate) fn begin_loading(&mut self, descriptor: &PluginDescriptor) {
        self.instances
            .insert(descriptor.id.clone(), PluginInstance::loading(descriptor.clone()));
    }

    pub(crate) fn activate(&mut self, id: &str, plugin: Arc<dyn Plugin>, subscriptions: Vec<SubscriptionId>) {
        if let Some(instance) = self.instances.get_mut(id) {
            instance.state = PluginState::Active;
            instance.plugin = Some(plugin);
            instance.subscriptions = subscriptions;
        }
    }

    /// Move a live instance to Unloading and hand back what must be torn down
    pub(crate) fn begin_unloading(&mut self, id: &str) -> Option<(PluginState, Option<Arc<dyn Plugin>>)> {
        let instance = self.instances.get_mut(id)?;
        let previous = instance.state;
        instance.state = PluginState::Unloading;
        instance.subscriptions.clear();
        Some((previous, instance.plugin.take()))
    }

    pub(crate) fn remove_instance(&mut self, id: &str) -> Option<PluginInstance> {
        self.instances.remove(id)
    }

    /// Put a plugin into Error, creating its instance if needed
    pub(crate) fn mark_error(&mut self, descriptor: &PluginDescriptor, kind: FailureKind, message: &str) -> PluginFailure {
        let failure = PluginFailure::new(&descriptor.id, kind, message);
        let instance = self
            .instances
            .entry(descriptor.id.clone())
            .or_insert_with(|| PluginInstance::loading(descriptor.clone()));
        instance.state = PluginState::Error;
        instance.plugin = None;
        instance.subscriptions.clear();
        instance.last_error = Some(failure.clone());
        self.push_recent(failure.clone());
        failure
    }

    /// Record a handler fault against its owning plugin; the plugin stays in its state.
    ///
    /// Returns the failure when the owner is a known live plugin.
    pub(crate) fn record_handler_fault(&mut self, fault: &HandlerFault) -> Option<PluginFailure> {
        let instance = self.instances.get_mut(&fault.owner)?;
        let failure = PluginFailure::new(&fault.owner, FailureKind::Handler, fault.to_string());
        instance.handler_errors += 1;
        instance.last_error = Some(failure.clone());
        self.push_recent(failure.clone());
        Some(failure)
    }

    pub(crate) fn push_recent(&mut self, failure: PluginFailure) {
        if self.recent_errors.len() == RECENT_ERRORS_LIMIT {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(failure);
    }

    /// Most recent failures, oldest first
    pub fn recent_errors(&self) -> Vec<PluginFailure> {
        self.recent_errors.iter().cloned().collect()
    }

    pub fn counts_by_state(&self) -> BTreeMap<PluginState, usize> {
        let mut counts = BTreeMap::new();
        for id in self.descriptors.keys() {
            *counts.entry(self.state_of(id)).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// One snapshot per known plugin, in load order
    pub fn snapshot(&self) -> Vec<PluginSnapshot> {
        self.descriptors_in_order()
            .into_iter()
            .map(|descriptor| {
                let instance = self.instances.get(&descriptor.id);
                PluginSnapshot {
                    state: self.state_of(&descriptor.id),
                    subscriptions: instance.map(|i| i.subscriptions.len()).unwrap_or(0),
                    handler_errors: instance.map(|i| i.handler_errors).unwrap_or(0),
                    last_error: instance.and_then(|i| i.last_error.as_ref()).map(|f| f.to_string()),
                    dependencies: descriptor.dependencies.iter().cloned().collect(),
                    id: descriptor.id,
                    version: descriptor.version,
                    enabled: descriptor.enabled,
                    priority: descriptor.priority,
                }
            })
            .collect()
    }
}
