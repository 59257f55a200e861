//! # Nexus Core Storage
//!
//! Configuration loading and its errors. The resolution cache file is handled
//! by [`ResolutionCache`](crate::plugin_system::ResolutionCache) itself through
//! [`write_atomic`](crate::utils::fs::write_atomic).
pub mod config;
pub mod error;

/// Re-export key types
pub use config::{CacheConfig, ConfigFormat, CoreConfig};
pub use error::StorageSystemError;
