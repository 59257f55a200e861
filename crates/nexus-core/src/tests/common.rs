//! Mock plugins and fixtures shared by the plugin system and kernel tests.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::event::{BusConfig, Event, EventBus, Publisher, SystemEvent};
use crate::kernel::constants;
use crate::plugin_system::{
    DefaultPluginManager, Plugin, PluginCatalog, PluginContext, PluginDescriptor, PluginError, ResolutionCache,
};

/// How a [`TestPlugin`] behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Subscribes to `work.*` and records what it receives
    Record,
    /// Fails during `init` after subscribing
    FailInit,
    /// Panics during `init`
    PanicInit,
    /// Subscribes to `work.*` and fails every event
    FailEvents,
    /// Answers `task.request` events
    Tasks,
    /// Subscribes to `lifecycle.*` and records what it receives
    Lifecycle,
}

/// Shared journal of plugin activity, keyed by plugin id
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl Journal {
    fn log(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    /// Every `init:<id>` / `shutdown:<id>` entry in order
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries with the given prefix, prefix stripped
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    /// Topics delivered to a plugin
    pub fn received(&self, id: &str) -> Vec<String> {
        self.received.lock().unwrap().get(id).cloned().unwrap_or_default()
    }
}

pub struct TestPlugin {
    id: String,
    behavior: Behavior,
    journal: Journal,
}

#[async_trait]
impl Plugin for TestPlugin {
    fn name(&self) -> &str {
        "test-plugin"
    }

    async fn init(&self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        self.journal.log(format!("init:{}", self.id));
        match self.behavior {
            Behavior::Record | Behavior::FailEvents => {
                ctx.subscribe("work.*", 0)?;
            }
            Behavior::FailInit => {
                ctx.subscribe("work.*", 0)?;
                return Err(PluginError::InitError("refusing to start".to_string()));
            }
            Behavior::PanicInit => panic!("init blew up"),
            Behavior::Tasks => {
                ctx.subscribe(constants::TOPIC_TASK_REQUEST, 0)?;
            }
            Behavior::Lifecycle => {
                ctx.subscribe("lifecycle.*", 0)?;
            }
        }
        Ok(())
    }

    async fn handle_event(&self, event: &Event, publisher: &Publisher) -> Result<(), PluginError> {
        self.journal
            .received
            .lock()
            .unwrap()
            .entry(self.id.clone())
            .or_default()
            .push(event.topic().to_string());
        match self.behavior {
            Behavior::FailEvents => Err(PluginError::ExecutionError(format!("cannot handle {}", event.topic()))),
            Behavior::Tasks => {
                let Some(SystemEvent::TaskRequest { task, correlation_id, payload }) = SystemEvent::task_request(event)
                else {
                    return Ok(());
                };
                if task == "never" {
                    return Ok(());
                }
                let response = SystemEvent::TaskResponse {
                    correlation_id,
                    ok: task == "echo",
                    payload: json!({ "task": task, "echo": payload }),
                };
                publisher.publish(response.topic(), response.payload())?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn shutdown(&self) -> Result<(), PluginError> {
        self.journal.log(format!("shutdown:{}", self.id));
        Ok(())
    }
}

/// Catalog with one entry point per [`Behavior`]
pub fn catalog(journal: &Journal) -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    let entries = [
        ("record", Behavior::Record),
        ("fail-init", Behavior::FailInit),
        ("panic-init", Behavior::PanicInit),
        ("fail-events", Behavior::FailEvents),
        ("tasks", Behavior::Tasks),
        ("lifecycle", Behavior::Lifecycle),
    ];
    for (entry_point, behavior) in entries {
        let journal = journal.clone();
        catalog.register(entry_point, move |descriptor| {
            Ok(Arc::new(TestPlugin {
                id: descriptor.id.clone(),
                behavior,
                journal: journal.clone(),
            }) as Arc<dyn Plugin>)
        });
    }
    catalog
}

/// Descriptor using the recording plugin
pub fn descriptor(id: &str, deps: &[&str]) -> PluginDescriptor {
    with_entry(id, deps, "record")
}

pub fn with_entry(id: &str, deps: &[&str], entry_point: &str) -> PluginDescriptor {
    deps.iter()
        .fold(PluginDescriptor::new(id, "1.0.0", entry_point), |d, dep| d.depends_on(dep))
}

/// Started bus plus a manager over the test catalog
pub fn manager(journal: &Journal) -> (EventBus, DefaultPluginManager) {
    let bus = EventBus::new(BusConfig::default());
    bus.start().unwrap();
    let manager = DefaultPluginManager::new(bus.clone(), catalog(journal), Arc::new(ResolutionCache::new(16)));
    (bus, manager)
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
