use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::event::{async_handler, sync_handler, BusConfig, EventBus};
use crate::kernel::constants;
use crate::kernel::error::Error;
use crate::kernel::lifecycle::{LifecycleController, LifecycleState};
use crate::plugin_system::{PluginState, ResolutionCache};
use crate::storage::CoreConfig;
use crate::tests::common::{catalog, descriptor, with_entry, Journal};

const GRACE: Duration = Duration::from_secs(5);

fn controller(journal: &Journal) -> LifecycleController {
    LifecycleController::new(
        EventBus::new(BusConfig::default()),
        catalog(journal),
        Arc::new(ResolutionCache::new(16)),
    )
}

#[tokio::test]
async fn test_start_then_stop_in_reverse_order() {
    let journal = Journal::default();
    let controller = controller(&journal);
    assert_eq!(controller.state(), LifecycleState::Stopped);

    let report = controller
        .start(vec![descriptor("b", &["a"]), descriptor("a", &[])])
        .await
        .unwrap();
    assert_eq!(report.order, vec!["a", "b"]);
    assert_eq!(report.active, vec!["a", "b"]);
    assert_eq!(controller.state(), LifecycleState::Running);
    assert!(controller.bus().is_running());

    let shutdown = controller.stop(GRACE).await.unwrap();
    assert_eq!(shutdown.stopped_plugins, 2);
    assert!(!shutdown.timed_out);
    assert_eq!(shutdown.abandoned, 0);
    assert_eq!(controller.state(), LifecycleState::Stopped);
    assert!(!controller.bus().is_running());
    assert_eq!(journal.with_prefix("shutdown:"), vec!["b", "a"]);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let journal = Journal::default();
    let controller = controller(&journal);
    controller.start(vec![descriptor("a", &[])]).await.unwrap();

    let err = controller.start(vec![]).await.unwrap_err();
    assert!(matches!(err, Error::KernelLifecycleError { .. }));
    assert_eq!(err.kind(), "lifecycle");
    assert_eq!(controller.state(), LifecycleState::Running);
    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_configuration_error_aborts_startup() {
    let journal = Journal::default();
    let controller = controller(&journal);

    let err = controller
        .start(vec![descriptor("a", &["b"]), descriptor("b", &["a"]), descriptor("c", &[])])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "configuration");
    assert_eq!(controller.state(), LifecycleState::Stopped);
    assert!(controller.bus().is_running());
    assert!(journal.entries().is_empty());
    assert_eq!(controller.status().await.plugins.count(PluginState::Active), 0);

    // A corrected set can be started afterwards
    let report = controller.start(vec![descriptor("c", &[])]).await.unwrap();
    assert_eq!(report.active, vec!["c"]);
    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_when_stopped_is_harmless() {
    let journal = Journal::default();
    let controller = controller(&journal);
    let report = controller.stop(GRACE).await.unwrap();
    assert_eq!(report.stopped_plugins, 0);
    assert!(!report.timed_out);
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_lifecycle_events_are_published() {
    let journal = Journal::default();
    let controller = controller(&journal);
    let topics = Arc::new(Mutex::new(Vec::new()));
    let topics_clone = topics.clone();
    controller
        .bus()
        .subscribe(
            "observer",
            "lifecycle.*",
            sync_handler(move |event| {
                topics_clone.lock().unwrap().push(event.topic().to_string());
                Ok(())
            }),
            0,
        )
        .unwrap();

    controller.start(vec![descriptor("a", &[])]).await.unwrap();
    controller.bus().drain(GRACE).await.unwrap();
    assert_eq!(*topics.lock().unwrap(), vec![constants::TOPIC_LIFECYCLE_STARTED]);

    controller.stop(GRACE).await.unwrap();
    assert_eq!(
        *topics.lock().unwrap(),
        vec![constants::TOPIC_LIFECYCLE_STARTED, constants::TOPIC_LIFECYCLE_SHUTDOWN]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_plugins_observe_shutdown_before_disable() {
    let journal = Journal::default();
    let controller = controller(&journal);

    for run in 1..=20 {
        controller.start(vec![with_entry("watcher", &[], "lifecycle")]).await.unwrap();
        let report = controller.stop(GRACE).await.unwrap();
        assert_eq!(report.stopped_plugins, 1);
        assert!(!report.timed_out);

        let shutdowns = journal
            .received("watcher")
            .iter()
            .filter(|topic| *topic == constants::TOPIC_LIFECYCLE_SHUTDOWN)
            .count();
        assert_eq!(shutdowns, run, "shutdown event missed on run {}", run);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_execute_round_trip() {
    let journal = Journal::default();
    let controller = controller(&journal);
    controller.start(vec![with_entry("worker", &[], "tasks")]).await.unwrap();

    let outcome = controller
        .execute("echo", json!({ "text": "hello" }), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.payload["task"], "echo");
    assert_eq!(outcome.payload["echo"]["text"], "hello");

    let second = controller.execute("other", json!(null), Duration::from_secs(2)).await.unwrap();
    assert!(!second.ok);
    assert!(second.correlation_id > outcome.correlation_id);

    // The temporary response subscriptions are gone
    assert!(controller
        .bus()
        .subscriptions()
        .iter()
        .all(|s| s.owner != constants::CONTROL_OWNER));
    controller.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_execute_times_out_without_response() {
    let journal = Journal::default();
    let controller = controller(&journal);
    controller.start(vec![with_entry("worker", &[], "tasks")]).await.unwrap();

    let err = controller
        .execute("never", json!(null), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(err.kind(), "timeout");
    assert!(journal.received("worker").contains(&constants::TOPIC_TASK_REQUEST.to_string()));
    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_execute_requires_running_controller() {
    let journal = Journal::default();
    let controller = controller(&journal);
    let err = controller
        .execute("echo", json!(null), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "lifecycle");
}

#[tokio::test]
async fn test_status_and_control_surface() {
    let journal = Journal::default();
    let controller = controller(&journal);
    let mut disabled = descriptor("later", &[]);
    disabled.enabled = false;
    controller.start(vec![descriptor("a", &[]), disabled]).await.unwrap();

    let status = controller.status().await;
    assert_eq!(status.state, LifecycleState::Running);
    assert_eq!(status.plugins.total, 2);
    assert_eq!(status.plugins.count(PluginState::Active), 1);
    assert_eq!(status.plugins.count(PluginState::Unloaded), 1);

    controller.enable("later").await.unwrap();
    assert_eq!(controller.instance_state("later").await, Some(PluginState::Active));
    controller.disable("a").await.unwrap();
    assert_eq!(controller.instance_state("a").await, Some(PluginState::Unloaded));
    assert_eq!(controller.instance_state("ghost").await, None);

    let addons = controller.list_addons().await;
    assert_eq!(addons.len(), 2);
    assert!(addons.iter().any(|p| p.id == "later" && p.state == PluginState::Active));

    let err = controller.enable("ghost").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_after_stop() {
    let journal = Journal::default();
    let controller = controller(&journal);
    controller.start(vec![descriptor("a", &[])]).await.unwrap();
    controller.stop(GRACE).await.unwrap();

    let report = controller.start(vec![descriptor("a", &[])]).await.unwrap();
    assert_eq!(report.active, vec!["a"]);
    assert_eq!(journal.with_prefix("init:"), vec!["a", "a"]);
    controller.stop(GRACE).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_reports_grace_timeout() {
    let journal = Journal::default();
    let controller = controller(&journal);
    controller
        .bus()
        .subscribe(
            "slow-observer",
            constants::TOPIC_LIFECYCLE_SHUTDOWN,
            async_handler(|_event| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(())
            }),
            0,
        )
        .unwrap();
    controller.start(vec![descriptor("a", &[])]).await.unwrap();

    let report = controller.stop(Duration::from_millis(50)).await.unwrap();
    assert!(report.timed_out);
    assert!(report.abandoned >= 1);
    assert_eq!(report.stopped_plugins, 1);
    assert_eq!(controller.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_from_config() {
    let journal = Journal::default();
    let config = CoreConfig {
        shutdown_grace_ms: 250,
        execute_timeout_ms: 750,
        plugins: vec![descriptor("a", &[])],
        ..CoreConfig::default()
    };
    let controller = LifecycleController::from_config(&config, catalog(&journal));
    assert_eq!(controller.shutdown_grace(), Duration::from_millis(250));
    assert_eq!(controller.execute_timeout(), Duration::from_millis(750));

    let report = controller.start(config.plugins.clone()).await.unwrap();
    assert_eq!(report.active, vec!["a"]);
    controller.shutdown().await.unwrap();
}
