use serde_json::json;

use crate::event::{Event, SystemEvent};
use crate::kernel::constants;

#[test]
fn test_system_event_topics() {
    let loaded = SystemEvent::PluginLoaded {
        plugin_id: "a".to_string(),
        version: "1.0.0".to_string(),
    };
    assert_eq!(loaded.topic(), constants::TOPIC_PLUGIN_LOADED);
    assert_eq!(loaded.payload(), json!({ "plugin_id": "a", "version": "1.0.0" }));

    let error = SystemEvent::PluginError {
        plugin_id: "b".to_string(),
        kind: "handler".to_string(),
        message: "boom".to_string(),
    };
    assert_eq!(error.topic(), "plugin.error");
    assert_eq!(error.payload()["kind"], "handler");

    assert_eq!(SystemEvent::LifecycleShutdown { grace_ms: 10 }.topic(), "lifecycle.shutdown");
}

#[test]
fn test_task_request_round_trip_through_event() {
    let request = SystemEvent::TaskRequest {
        task: "echo".to_string(),
        correlation_id: 7,
        payload: json!({ "text": "hi" }),
    };
    let event = Event::new(request.topic(), request.payload(), "control", 1);
    assert_eq!(SystemEvent::task_request(&event), Some(request));
    assert_eq!(SystemEvent::task_response(&event), None);
}

#[test]
fn test_task_response_requires_correlation_id() {
    let event = Event::new(constants::TOPIC_TASK_RESPONSE, json!({ "ok": true }), "tasks", 1);
    assert_eq!(SystemEvent::task_response(&event), None);

    let event = Event::new(constants::TOPIC_TASK_RESPONSE, json!({ "correlation_id": 3 }), "tasks", 2);
    assert_eq!(
        SystemEvent::task_response(&event),
        Some(SystemEvent::TaskResponse {
            correlation_id: 3,
            ok: false,
            payload: json!(null),
        })
    );
}

#[test]
fn test_event_accessors() {
    let event = Event::new("user.login", json!({ "name": "ada" }), "auth", 42);
    assert_eq!(event.topic(), "user.login");
    assert_eq!(event.source(), "auth");
    assert_eq!(event.sequence(), 42);
    assert_eq!(event.payload_str("name"), Some("ada"));
    assert_eq!(event.payload_str("missing"), None);
}
