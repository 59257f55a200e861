//! # Nexus Core
//!
//! In-process coordination core of a plugin-based application: an
//! asynchronous topic bus paired with a dependency-aware plugin lifecycle.
//!
//! - [`event`]: the [`EventBus`], publishers, topic patterns and handler faults.
//! - [`plugin_system`]: descriptors, dependency resolution, the resolution
//!   cache, the plugin catalog and the [`DefaultPluginManager`].
//! - [`kernel`]: the [`LifecycleController`], kernel errors and constants.
//! - [`storage`]: [`CoreConfig`] loading in JSON, YAML or TOML.
//! - [`utils`]: filesystem helpers.
pub mod event;
pub mod kernel;
pub mod plugin_system;
pub mod storage;
pub mod utils;

// Re-export key public types/traits for easier use by the binary and plugins
pub use event::{Event, EventBus, EventHandler, EventPayload, Publisher, SystemEvent};
pub use kernel::error::Error as KernelError;
pub use kernel::{LifecycleController, LifecycleState, ShutdownReport};
pub use plugin_system::{
    DefaultPluginManager, Plugin, PluginCatalog, PluginContext, PluginDescriptor, PluginError, PluginManager,
    PluginState,
};
pub use storage::CoreConfig;

#[cfg(test)]
mod tests;
