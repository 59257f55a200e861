//! Core plugin that writes every event seen on the bus to the log.
//!
//! Regular traffic is logged at debug; `plugin.error` events are raised to
//! warn so that plugin failures show up with the default filter.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::{debug, info, warn};
use nexus_core::kernel::constants;
use nexus_core::{Event, Plugin, PluginCatalog, PluginContext, PluginDescriptor, PluginError, Publisher};

/// Entry point name used in plugin descriptors
pub const ENTRY_POINT: &str = "core-logging";

/// Audit subscriptions run after every other subscriber of an event
const AUDIT_PRIORITY: i32 = i32::MIN;

#[derive(Debug)]
pub struct LoggingPlugin {
    id: String,
    seen: AtomicU64,
}

impl LoggingPlugin {
    pub fn new(descriptor: &PluginDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            seen: AtomicU64::new(0),
        }
    }

    /// Number of events audited so far
    pub fn events_seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Plugin for LoggingPlugin {
    fn name(&self) -> &str {
        ENTRY_POINT
    }

    async fn init(&self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        ctx.subscribe("*", AUDIT_PRIORITY)?;
        info!("Core logging plugin '{}' auditing all topics", self.id);
        Ok(())
    }

    async fn handle_event(&self, event: &Event, _publisher: &Publisher) -> Result<(), PluginError> {
        self.seen.fetch_add(1, Ordering::Relaxed);
        if event.topic() == constants::TOPIC_PLUGIN_ERROR {
            warn!(
                "[{}] plugin '{}' reported {}: {}",
                event.topic(),
                event.payload_str("plugin_id").unwrap_or("?"),
                event.payload_str("kind").unwrap_or("error"),
                event.payload_str("message").unwrap_or(""),
            );
        } else {
            debug!(
                "[{}] #{} from '{}': {}",
                event.topic(),
                event.sequence(),
                event.source(),
                event.payload()
            );
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), PluginError> {
        info!("Core logging plugin '{}' audited {} event(s)", self.id, self.events_seen());
        Ok(())
    }
}

/// Register the plugin factory under [`ENTRY_POINT`]
pub fn register(catalog: &mut PluginCatalog) {
    catalog.register(ENTRY_POINT, |descriptor| {
        Ok(Arc::new(LoggingPlugin::new(descriptor)) as Arc<dyn Plugin>)
    });
}
