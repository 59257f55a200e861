//! Core plugin answering `task.request` events.
//!
//! Built-in tasks:
//!
//! - `ping`: replies `{"pong": true, "plugin": <id>}`.
//! - `echo`: replies with the request payload unchanged.
//! - `sum`: adds up a payload array of numbers.
//!
//! Unknown tasks get a response with `ok: false` and an `error` message, so
//! callers fail fast instead of waiting for their timeout.
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use nexus_core::kernel::constants;
use nexus_core::{
    Event, EventPayload, Plugin, PluginCatalog, PluginContext, PluginDescriptor, PluginError, Publisher,
    SystemEvent,
};
use serde_json::json;

/// Entry point name used in plugin descriptors
pub const ENTRY_POINT: &str = "core-tasks";

/// Names of the tasks this plugin answers
pub const TASKS: [&str; 3] = ["echo", "ping", "sum"];

#[derive(Debug)]
pub struct TasksPlugin {
    id: String,
}

impl TasksPlugin {
    pub fn new(descriptor: &PluginDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
        }
    }

    /// Run one task, returning `(ok, payload)`
    pub fn run(&self, task: &str, payload: EventPayload) -> (bool, EventPayload) {
        match task {
            "ping" => (true, json!({ "pong": true, "plugin": self.id })),
            "echo" => (true, payload),
            "sum" => match payload.as_array() {
                Some(items) => {
                    let numbers: Option<Vec<f64>> = items.iter().map(|v| v.as_f64()).collect();
                    match numbers {
                        Some(numbers) => (true, json!({ "sum": numbers.iter().sum::<f64>() })),
                        None => (false, json!({ "error": "sum expects an array of numbers" })),
                    }
                }
                None => (false, json!({ "error": "sum expects an array of numbers" })),
            },
            other => (false, json!({ "error": format!("unknown task '{}'", other) })),
        }
    }
}

#[async_trait]
impl Plugin for TasksPlugin {
    fn name(&self) -> &str {
        ENTRY_POINT
    }

    async fn init(&self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        ctx.subscribe(constants::TOPIC_TASK_REQUEST, 0)?;
        info!("Core tasks plugin '{}' serving: {}", self.id, TASKS.join(", "));
        Ok(())
    }

    async fn handle_event(&self, event: &Event, publisher: &Publisher) -> Result<(), PluginError> {
        let Some(SystemEvent::TaskRequest { task, correlation_id, payload }) = SystemEvent::task_request(event) else {
            return Err(PluginError::ExecutionError(format!(
                "malformed task request #{} from '{}'",
                event.sequence(),
                event.source()
            )));
        };
        debug!("Running task '{}' (correlation {})", task, correlation_id);

        let (ok, payload) = self.run(&task, payload);
        let response = SystemEvent::TaskResponse { correlation_id, ok, payload };
        publisher.publish(response.topic(), response.payload())?;
        Ok(())
    }
}

/// Register the plugin factory under [`ENTRY_POINT`]
pub fn register(catalog: &mut PluginCatalog) {
    catalog.register(ENTRY_POINT, |descriptor| {
        Ok(Arc::new(TasksPlugin::new(descriptor)) as Arc<dyn Plugin>)
    });
}
