//! # Nexus Core Kernel
//!
//! The `kernel` module sequences the rest of the core.
//!
//! ## Key Responsibilities & Components:
//!
//! - **Lifecycle**: [`LifecycleController`](lifecycle::LifecycleController) starts
//!   the event bus and the plugin manager, loads the configured plugins, and
//!   tears everything down within a grace period. It also carries the control
//!   surface (`list_addons`, `enable`, `execute`, `status`).
//! - **Component Lifecycle**: the [`KernelComponent`](component::KernelComponent)
//!   trait implemented by the bus and the plugin manager.
//! - **Core Constants**: well-known topics and defaults in `constants`.
//! - **Error Handling**: the aggregated [`Error`](error::Error) and its `Result` alias.
pub mod component;
pub mod constants;
pub mod error;
pub mod lifecycle;

pub use component::KernelComponent;
pub use error::{Error, KernelLifecyclePhase, Result};
pub use lifecycle::{ControllerStatus, LifecycleController, LifecycleState, ShutdownReport, TaskOutcome};

// Test module declaration
#[cfg(test)]
mod tests;
