use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::event::{sync_handler, EventBus, EventPayload, Publisher, SystemEvent};
use crate::kernel::component::KernelComponent;
use crate::kernel::constants;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::plugin_system::{
    DefaultPluginManager, LoadReport, PluginCatalog, PluginDescriptor, PluginManager, PluginSnapshot, PluginState,
    PluginStatus, ResolutionCache,
};
use crate::storage::config::CoreConfig;

/// State of the [`LifecycleController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What `stop` had to give up on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// The grace period ran out before the bus drained
    pub timed_out: bool,
    /// Handlers and queued deliveries abandoned when the bus stopped
    pub abandoned: usize,
    /// Plugins torn down during this stop
    pub stopped_plugins: usize,
}

/// Answer to an `execute` request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub correlation_id: u64,
    pub ok: bool,
    pub payload: EventPayload,
}

/// Controller state plus plugin health
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub state: LifecycleState,
    pub plugins: PluginStatus,
}

/// Sequences startup and shutdown of the bus and the plugin manager, and
/// exposes the control surface used by front ends.
pub struct LifecycleController {
    state: Mutex<LifecycleState>,
    bus: EventBus,
    manager: Arc<DefaultPluginManager>,
    publisher: Publisher,
    next_correlation: AtomicU64,
    shutdown_grace: Duration,
    execute_timeout: Duration,
}

impl LifecycleController {
    pub fn new(bus: EventBus, catalog: PluginCatalog, cache: Arc<ResolutionCache>) -> Self {
        let manager = Arc::new(DefaultPluginManager::new(bus.clone(), catalog, cache));
        let publisher = bus.publisher(constants::CONTROL_OWNER);
        Self {
            state: Mutex::new(LifecycleState::Stopped),
            bus,
            manager,
            publisher,
            next_correlation: AtomicU64::new(0),
            shutdown_grace: Duration::from_millis(constants::DEFAULT_SHUTDOWN_GRACE_MS),
            execute_timeout: Duration::from_millis(constants::DEFAULT_EXECUTE_TIMEOUT_MS),
        }
    }

    /// Build the bus, cache and manager described by a configuration
    pub fn from_config(config: &CoreConfig, catalog: PluginCatalog) -> Self {
        let cache = match &config.cache.path {
            Some(path) => ResolutionCache::with_store(path, config.cache.capacity),
            None => ResolutionCache::new(config.cache.capacity),
        };
        Self::new(EventBus::new(config.bus.clone()), catalog, Arc::new(cache))
            .with_shutdown_grace(config.shutdown_grace())
            .with_execute_timeout(config.execute_timeout())
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_guard()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn plugin_manager(&self) -> &Arc<DefaultPluginManager> {
        &self.manager
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn execute_timeout(&self) -> Duration {
        self.execute_timeout
    }

    fn state_guard(&self) -> std::sync::MutexGuard<'_, LifecycleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state_guard();
        log::debug!("Lifecycle {} -> {}", *state, next);
        *state = next;
    }

    /// Move from `from` to `to`, or fail with a lifecycle error for `phase`
    fn transition(&self, from: LifecycleState, to: LifecycleState, phase: KernelLifecyclePhase) -> Result<()> {
        let mut state = self.state_guard();
        if *state != from {
            return Err(Error::lifecycle(phase, format!("controller is {}, expected {}", *state, from)));
        }
        *state = to;
        Ok(())
    }

    fn ensure_running(&self, phase: KernelLifecyclePhase) -> Result<()> {
        let state = self.state();
        if state != LifecycleState::Running {
            return Err(Error::lifecycle(phase, format!("controller is {}", state)));
        }
        Ok(())
    }

    fn components(&self) -> [Arc<dyn KernelComponent>; 2] {
        let bus: Arc<dyn KernelComponent> = Arc::new(self.bus.clone());
        let manager: Arc<dyn KernelComponent> = self.manager.clone();
        [bus, manager]
    }

    fn emit(&self, event: SystemEvent) {
        let topic = event.topic();
        if let Err(e) = self.publisher.publish(topic, event.payload()) {
            log::warn!("Could not publish '{}': {}", topic, e);
        }
    }

    /// Start the bus, then the plugin manager, then load every descriptor.
    ///
    /// A configuration error aborts startup: the controller returns to
    /// Stopped with the bus still running and no plugin active.
    pub async fn start(&self, descriptors: Vec<PluginDescriptor>) -> Result<LoadReport> {
        self.transition(LifecycleState::Stopped, LifecycleState::Starting, KernelLifecyclePhase::Start)?;
        log::info!("Starting {} v{}", constants::APP_NAME, constants::APP_VERSION);

        for component in self.components() {
            log::info!("Starting component: {}", component.name());
            if let Err(e) = component.start().await {
                log::error!("Error starting component {}: {}", component.name(), e);
                self.set_state(LifecycleState::Stopped);
                return Err(Error::KernelLifecycleError {
                    phase: KernelLifecyclePhase::Start,
                    message: format!("component {} failed to start", component.name()),
                    source: Some(Box::new(e)),
                });
            }
        }

        match self.manager.load_all(descriptors).await {
            Ok(report) => {
                self.set_state(LifecycleState::Running);
                self.emit(SystemEvent::LifecycleStarted {
                    active_plugins: report.active.len(),
                });
                log::info!("{} running with {} active plugin(s)", constants::APP_NAME, report.active.len());
                Ok(report)
            }
            Err(e) => {
                log::error!("Startup aborted: {}", e);
                self.set_state(LifecycleState::Stopped);
                Err(e.into())
            }
        }
    }

    /// Stop using the configured grace period
    pub async fn shutdown(&self) -> Result<ShutdownReport> {
        self.stop(self.shutdown_grace).await
    }

    /// Announce shutdown, tear plugins down in reverse load order, then wait up
    /// to `grace` for in-flight handlers before stopping the bus.
    pub async fn stop(&self, grace: Duration) -> Result<ShutdownReport> {
        let previous = {
            let mut state = self.state_guard();
            match *state {
                LifecycleState::Running => {
                    *state = LifecycleState::Stopping;
                    LifecycleState::Running
                }
                LifecycleState::Stopped => LifecycleState::Stopped,
                other => {
                    return Err(Error::lifecycle(
                        KernelLifecyclePhase::Shutdown,
                        format!("controller is {}", other),
                    ));
                }
            }
        };

        if previous == LifecycleState::Stopped {
            let abandoned = self.bus.stop();
            return Ok(ShutdownReport {
                abandoned,
                ..ShutdownReport::default()
            });
        }

        log::info!("Stopping {} (grace {:?})", constants::APP_NAME, grace);
        let deadline = Instant::now() + grace;
        self.emit(SystemEvent::LifecycleShutdown {
            grace_ms: grace.as_millis() as u64,
        });

        // Plugins observe the shutdown event before they are disabled
        let mut timed_out = false;
        if let Err(e) = self.bus.drain(grace).await {
            log::warn!("Shutdown announcement not fully delivered: {}", e);
            timed_out = true;
        }

        let stopped_plugins = self.manager.disable_all().await;
        if let Err(e) = self.bus.drain(deadline.saturating_duration_since(Instant::now())).await {
            log::warn!("Shutdown grace period exceeded: {}", e);
            timed_out = true;
        }
        let abandoned = self.bus.stop();
        if abandoned > 0 {
            log::warn!("Abandoned {} in-flight delivery(ies) at shutdown", abandoned);
        }

        self.set_state(LifecycleState::Stopped);
        log::info!("{} stopped ({} plugin(s) unloaded)", constants::APP_NAME, stopped_plugins);
        Ok(ShutdownReport {
            timed_out,
            abandoned,
            stopped_plugins,
        })
    }

    pub async fn list_addons(&self) -> Vec<PluginSnapshot> {
        self.manager.snapshot().await
    }

    pub async fn enable(&self, id: &str) -> Result<()> {
        Ok(self.manager.enable(id).await?)
    }

    pub async fn disable(&self, id: &str) -> Result<()> {
        Ok(self.manager.disable(id).await?)
    }

    pub async fn reload(&self, id: &str, replacement: Option<PluginDescriptor>) -> Result<()> {
        Ok(self.manager.reload(id, replacement).await?)
    }

    pub async fn instance_state(&self, id: &str) -> Option<PluginState> {
        self.manager.instance_state(id).await
    }

    pub async fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state(),
            plugins: self.manager.status().await,
        }
    }

    /// Publish a `task.request` and wait for the matching `task.response`
    pub async fn execute(&self, task: &str, payload: EventPayload, timeout: Duration) -> Result<TaskOutcome> {
        self.ensure_running(KernelLifecyclePhase::Execute)?;
        let correlation_id = self.next_correlation.fetch_add(1, Ordering::SeqCst) + 1;

        let (tx, rx) = oneshot::channel();
        let reply = Arc::new(Mutex::new(Some(tx)));
        let handler = sync_handler(move |event| {
            if let Some(SystemEvent::TaskResponse { correlation_id: id, ok, payload }) = SystemEvent::task_response(event) {
                if id == correlation_id {
                    let sender = reply.lock().ok().and_then(|mut slot| slot.take());
                    if let Some(sender) = sender {
                        let _ = sender.send(TaskOutcome { correlation_id, ok, payload });
                    }
                }
            }
            Ok(())
        });
        let subscription = self
            .bus
            .subscribe(constants::CONTROL_OWNER, constants::TOPIC_TASK_RESPONSE, handler, 0)?;

        let request = SystemEvent::TaskRequest {
            task: task.to_string(),
            correlation_id,
            payload,
        };
        let result = match self.publisher.publish(request.topic(), request.payload()) {
            Err(e) => Err(e.into()),
            Ok(_) => match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(_)) => Err(Error::Other(format!("response channel for task '{}' closed", task))),
                Err(_) => {
                    log::warn!("Task '{}' (correlation {}) timed out after {:?}", task, correlation_id, timeout);
                    Err(Error::Timeout {
                        operation: format!("execute '{}'", task),
                        waited: timeout,
                    })
                }
            },
        };

        if let Err(e) = self.bus.unsubscribe(subscription) {
            log::debug!("Response subscription already gone: {}", e);
        }
        result
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .field("bus", &self.bus)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}
