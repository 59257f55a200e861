//! # Nexus Core Plugin System Errors
//!
//! Defines error types specific to the Nexus plugin system.
//!
//! [`PluginSystemError`] is what callers of the plugin manager see. Its
//! `ConfigurationError` variant wraps a [`DependencyError`] from the resolver
//! and is fatal to `load_all`; `LoadError` is isolated to one plugin and its
//! dependents.
use crate::plugin_system::dependency::DependencyError;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] DependencyError),

    #[error("Plugin loading failed for '{plugin_id}': {message}")]
    LoadError {
        plugin_id: String,
        message: String,
    },

    #[error("Plugin '{plugin_id}' references unknown entry point '{entry_point}'")]
    UnknownEntryPoint {
        plugin_id: String,
        entry_point: String,
    },

    #[error("Plugin '{plugin_id}' cannot be activated: dependency '{dependency}' is not active")]
    DependencyNotActive {
        plugin_id: String,
        dependency: String,
    },

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin shutdown error for '{plugin_id}': {message}")]
    ShutdownError {
        plugin_id: String,
        message: String,
    },

    #[error("Internal plugin system error: {0}")]
    InternalError(String),
}

impl PluginSystemError {
    /// Stable machine-readable kind string
    pub fn kind(&self) -> &'static str {
        match self {
            PluginSystemError::ConfigurationError(_) => "configuration",
            PluginSystemError::LoadError { .. } | PluginSystemError::UnknownEntryPoint { .. } => "load",
            PluginSystemError::DependencyNotActive { .. } => "dependency_not_active",
            PluginSystemError::PluginNotFound(_) => "not_found",
            PluginSystemError::ShutdownError { .. } => "shutdown",
            PluginSystemError::InternalError(_) => "internal",
        }
    }
}
