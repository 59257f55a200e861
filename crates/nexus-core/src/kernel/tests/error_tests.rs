use std::time::Duration;

use crate::event::EventSystemError;
use crate::kernel::error::{Error, KernelLifecyclePhase};
use crate::plugin_system::dependency::DependencyError;
use crate::plugin_system::PluginSystemError;
use crate::storage::StorageSystemError;

#[test]
fn test_kinds_follow_the_subsystem_error() {
    let err: Error = PluginSystemError::PluginNotFound("ghost".to_string()).into();
    assert_eq!(err.kind(), "not_found");

    let err: Error = EventSystemError::QueueFull {
        topic: "x".to_string(),
        capacity: 4,
    }
    .into();
    assert_eq!(err.kind(), "queue_full");

    let err: Error = StorageSystemError::FileNotFound("missing.json".into()).into();
    assert_eq!(err.kind(), "storage");
}

#[test]
fn test_dependency_error_becomes_configuration_error() {
    let err: Error = DependencyError::MissingPlugin {
        plugin: "a".to_string(),
        dependency: "b".to_string(),
    }
    .into();
    assert!(matches!(
        err,
        Error::PluginSystem(PluginSystemError::ConfigurationError(DependencyError::MissingPlugin { .. }))
    ));
    assert_eq!(err.kind(), "configuration");
}

#[test]
fn test_lifecycle_error_reports_inner_kind() {
    let bare = Error::lifecycle(KernelLifecyclePhase::Start, "already running");
    assert_eq!(bare.kind(), "lifecycle");
    assert_eq!(bare.to_string(), "Kernel lifecycle error during Start: already running");

    let wrapped = Error::KernelLifecycleError {
        phase: KernelLifecyclePhase::Start,
        message: "component failed".to_string(),
        source: Some(Box::new(Error::Timeout {
            operation: "start".to_string(),
            waited: Duration::from_millis(10),
        })),
    };
    assert_eq!(wrapped.kind(), "timeout");
}

#[test]
fn test_string_conversions() {
    let err: Error = "boom".into();
    assert!(matches!(err, Error::Other(ref m) if m == "boom"));
    assert_eq!(err.kind(), "other");

    let err = Error::io(
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        "read",
        "/tmp/x".into(),
    );
    assert!(matches!(err, Error::StorageSystem(StorageSystemError::Io { .. })));
}
