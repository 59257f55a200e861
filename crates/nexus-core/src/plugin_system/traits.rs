use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::event::{Event, EventBus, EventHandler, EventPayload, EventSystemError, HandlerResult, Publisher, SubscriptionId};
use crate::plugin_system::descriptor::PluginDescriptor;

/// Error type for plugin operations
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin initialization error: {0}")]
    InitError(String),
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    #[error("Plugin shutdown error: {0}")]
    ShutdownError(String),
    #[error("Plugin bus error: {0}")]
    Bus(#[from] EventSystemError),
}

/// Core trait that all plugins must implement.
///
/// A plugin subscribes during [`Plugin::init`] through its [`PluginContext`];
/// matching events are then delivered to [`Plugin::handle_event`] together
/// with a publisher scoped to the plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The name of the plugin
    fn name(&self) -> &str;

    /// Initialize the plugin and register its subscriptions
    async fn init(&self, ctx: &mut PluginContext) -> Result<(), PluginError>;

    /// Handle one event delivered to one of the plugin's subscriptions
    async fn handle_event(&self, event: &Event, publisher: &Publisher) -> Result<(), PluginError>;

    /// Shutdown the plugin
    async fn shutdown(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Routes bus deliveries to a plugin's `handle_event`
struct PluginEventHandler {
    plugin: Arc<dyn Plugin>,
    publisher: Publisher,
}

#[async_trait]
impl EventHandler for PluginEventHandler {
    async fn handle(&self, event: Arc<Event>) -> HandlerResult {
        self.plugin.handle_event(&event, &self.publisher).await?;
        Ok(())
    }
}

/// Everything a plugin may touch while initializing
pub struct PluginContext {
    descriptor: PluginDescriptor,
    bus: EventBus,
    publisher: Publisher,
    handler: Arc<dyn EventHandler>,
    subscriptions: Vec<SubscriptionId>,
}

impl PluginContext {
    pub(crate) fn new(descriptor: PluginDescriptor, bus: EventBus, plugin: Arc<dyn Plugin>) -> Self {
        let publisher = bus.publisher(&descriptor.id);
        let handler: Arc<dyn EventHandler> = Arc::new(PluginEventHandler {
            plugin,
            publisher: publisher.clone(),
        });
        Self {
            descriptor,
            bus,
            publisher,
            handler,
            subscriptions: Vec::new(),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Deliver events matching `pattern` to this plugin's `handle_event`
    pub fn subscribe(&mut self, pattern: &str, priority: i32) -> Result<SubscriptionId, PluginError> {
        let handler = self.handler.clone();
        self.subscribe_with(pattern, handler, priority)
    }

    /// Subscribe a separate handler owned by this plugin
    pub fn subscribe_with(
        &mut self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> Result<SubscriptionId, PluginError> {
        let id = self.bus.subscribe(&self.descriptor.id, pattern, handler, priority)?;
        self.subscriptions.push(id);
        Ok(id)
    }

    /// Publisher whose events carry this plugin's id as source
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn publish(&self, topic: &str, payload: EventPayload) -> Result<u64, PluginError> {
        Ok(self.publisher.publish(topic, payload)?)
    }

    pub fn subscriptions(&self) -> &[SubscriptionId] {
        &self.subscriptions
    }

    pub(crate) fn into_subscriptions(self) -> Vec<SubscriptionId> {
        self.subscriptions
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.descriptor.id)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}
