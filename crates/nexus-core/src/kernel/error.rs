//! # Nexus Core Kernel Errors
//!
//! Defines the top-level error type of the Nexus core.
//!
//! [`Error`] aggregates the typed errors of each subsystem (plugin system,
//! event bus, storage) and adds the kernel's own lifecycle and timeout
//! failures. Every variant maps to a stable [`Error::kind`] string so that
//! front ends can report failures without matching on messages.
use std::path::PathBuf;
use std::result::Result as StdResult;
use std::time::Duration;

use crate::event::error::EventSystemError;
use crate::plugin_system::dependency::DependencyError;
use crate::plugin_system::error::PluginSystemError;
use crate::storage::error::StorageSystemError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Specific, typed plugin system error
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    #[error("Event system error: {0}")]
    EventSystem(#[from] EventSystemError),

    /// Specific, typed storage system error
    #[error("Storage system error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Error occurring during a specific kernel lifecycle phase.
    #[error("Kernel lifecycle error during {phase}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// An operation did not complete within its deadline
    #[error("Operation '{operation}' timed out after {waited:?}")]
    Timeout { operation: String, waited: Duration },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Represents a specific phase in the kernel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("Bootstrap")]
    Bootstrap,
    #[error("Start")]
    Start,
    #[error("Execute")]
    Execute,
    #[error("Shutdown")]
    Shutdown,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl Error {
    /// Helper to create an I/O error with context
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::Io {
            source,
            operation: operation.into(),
            path,
        })
    }

    pub fn lifecycle(phase: KernelLifecyclePhase, message: impl Into<String>) -> Self {
        Error::KernelLifecycleError {
            phase,
            message: message.into(),
            source: None,
        }
    }

    /// Stable machine-readable kind string
    pub fn kind(&self) -> &'static str {
        match self {
            Error::PluginSystem(e) => e.kind(),
            Error::EventSystem(e) => e.kind(),
            Error::StorageSystem(_) => "storage",
            Error::KernelLifecycleError { source: Some(inner), .. } => inner.kind(),
            Error::KernelLifecycleError { .. } => "lifecycle",
            Error::Timeout { .. } => "timeout",
            Error::Other(_) => "other",
        }
    }
}

impl From<DependencyError> for Error {
    fn from(err: DependencyError) -> Self {
        Error::PluginSystem(PluginSystemError::ConfigurationError(err))
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
