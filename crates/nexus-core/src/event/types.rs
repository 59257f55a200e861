use serde_json::json;

use crate::event::EventPayload;
use crate::kernel::constants;

/// Events emitted by the core on well-known topics
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    /// Lifecycle controller finished starting
    LifecycleStarted { active_plugins: usize },
    /// Lifecycle controller is shutting down
    LifecycleShutdown { grace_ms: u64 },
    /// Plugin reached Active
    PluginLoaded { plugin_id: String, version: String },
    /// Plugin was unloaded
    PluginUnloaded { plugin_id: String },
    /// Plugin failed to load or one of its handlers failed
    PluginError { plugin_id: String, kind: String, message: String },
    /// Control surface task request
    TaskRequest { task: String, correlation_id: u64, payload: EventPayload },
    /// Response to a task request
    TaskResponse { correlation_id: u64, ok: bool, payload: EventPayload },
}

impl SystemEvent {
    /// Topic this event is published on
    pub fn topic(&self) -> &'static str {
        match self {
            SystemEvent::LifecycleStarted { .. } => constants::TOPIC_LIFECYCLE_STARTED,
            SystemEvent::LifecycleShutdown { .. } => constants::TOPIC_LIFECYCLE_SHUTDOWN,
            SystemEvent::PluginLoaded { .. } => constants::TOPIC_PLUGIN_LOADED,
            SystemEvent::PluginUnloaded { .. } => constants::TOPIC_PLUGIN_UNLOADED,
            SystemEvent::PluginError { .. } => constants::TOPIC_PLUGIN_ERROR,
            SystemEvent::TaskRequest { .. } => constants::TOPIC_TASK_REQUEST,
            SystemEvent::TaskResponse { .. } => constants::TOPIC_TASK_RESPONSE,
        }
    }

    /// JSON payload carried by this event
    pub fn payload(&self) -> EventPayload {
        match self {
            SystemEvent::LifecycleStarted { active_plugins } => json!({ "active_plugins": active_plugins }),
            SystemEvent::LifecycleShutdown { grace_ms } => json!({ "grace_ms": grace_ms }),
            SystemEvent::PluginLoaded { plugin_id, version } => json!({ "plugin_id": plugin_id, "version": version }),
            SystemEvent::PluginUnloaded { plugin_id } => json!({ "plugin_id": plugin_id }),
            SystemEvent::PluginError { plugin_id, kind, message } => {
                json!({ "plugin_id": plugin_id, "kind": kind, "message": message })
            }
            SystemEvent::TaskRequest { task, correlation_id, payload } => {
                json!({ "task": task, "correlation_id": correlation_id, "payload": payload })
            }
            SystemEvent::TaskResponse { correlation_id, ok, payload } => {
                json!({ "correlation_id": correlation_id, "ok": ok, "payload": payload })
            }
        }
    }

    /// Parse a task request back out of a bus event
    pub fn task_request(event: &crate::event::Event) -> Option<SystemEvent> {
        if event.topic() != constants::TOPIC_TASK_REQUEST {
            return None;
        }
        let payload = event.payload();
        Some(SystemEvent::TaskRequest {
            task: payload.get("task")?.as_str()?.to_string(),
            correlation_id: payload.get("correlation_id")?.as_u64()?,
            payload: payload.get("payload").cloned().unwrap_or(EventPayload::Null),
        })
    }

    /// Parse a task response back out of a bus event
    pub fn task_response(event: &crate::event::Event) -> Option<SystemEvent> {
        if event.topic() != constants::TOPIC_TASK_RESPONSE {
            return None;
        }
        let payload = event.payload();
        Some(SystemEvent::TaskResponse {
            correlation_id: payload.get("correlation_id")?.as_u64()?,
            ok: payload.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            payload: payload.get("payload").cloned().unwrap_or(EventPayload::Null),
        })
    }
}
