//! # Nexus Core Plugin System
//!
//! Describes, orders, activates and tears down plugins.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`descriptor`]**: [`PluginDescriptor`], the static description of a plugin
//!   and its content fingerprint.
//! - **[`dependency`]**: the dependency graph and its deterministic topological
//!   sort ([`resolve_load_order`]).
//! - **[`cache`]**: [`ResolutionCache`], memoized load orders keyed by
//!   descriptor-set hash, optionally persisted to disk.
//! - **[`catalog`]**: [`PluginCatalog`], statically registered plugin factories
//!   keyed by entry point.
//! - **[`traits`]**: the [`Plugin`] trait and the [`PluginContext`] handed to
//!   plugins during initialization.
//! - **[`registry`]**: [`PluginRegistry`], the descriptor set plus live
//!   [`PluginInstance`]s and the recent-error ring.
//! - **[`manager`]**: [`PluginManager`] / [`DefaultPluginManager`], the only
//!   component that mutates plugin state.
//! - **[`error`]**: [`PluginSystemError`].
pub mod cache;
pub mod catalog;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod manager;
pub mod registry;
pub mod traits;

pub use cache::{CacheStats, ResolutionCache};
pub use catalog::{PluginCatalog, PluginFactory};
pub use dependency::{resolve_load_order, DependencyError, DependencyGraph};
pub use descriptor::PluginDescriptor;
pub use error::PluginSystemError;
pub use manager::{DefaultPluginManager, LoadReport, PluginManager, PluginResult, PluginStatus};
pub use registry::{FailureKind, PluginFailure, PluginInstance, PluginRegistry, PluginSnapshot, PluginState};
pub use traits::{Plugin, PluginContext, PluginError};

// Test module declaration
#[cfg(test)]
mod tests;
