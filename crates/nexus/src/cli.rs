use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nexus_core::{CoreConfig, PluginCatalog, PluginDescriptor};

/// Nexus: event bus and plugin lifecycle core
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Print "pong" and exit without starting the core
    #[arg(long)]
    pub ping: bool,

    /// Configuration file (.json, .yaml, .yml or .toml); built-in plugins when omitted
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured plugins and their states
    ListAddons,
    /// Enable a plugin and load it if its dependencies are active
    Enable {
        /// Plugin id
        id: String,
    },
    /// Disable a plugin (dependents are left running)
    Disable {
        /// Plugin id
        id: String,
    },
    /// Tear a plugin down and load it again
    Reload {
        /// Plugin id
        id: String,
    },
    /// Publish a task request and wait for its response
    Execute {
        /// Task name, e.g. "ping" or "echo"
        task: String,
        /// JSON payload sent with the request
        #[arg(long, default_value = "null")]
        payload: String,
        /// Milliseconds to wait for the response
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Show controller state, plugin counts and recent errors
    Status,
}

/// Catalog of the statically linked core plugins
pub fn core_catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    core_logging::register(&mut catalog);
    core_tasks::register(&mut catalog);
    catalog
}

/// Configuration used when no file is given
pub fn builtin_config() -> CoreConfig {
    CoreConfig {
        plugins: vec![
            PluginDescriptor::new("logging", env!("CARGO_PKG_VERSION"), core_logging::ENTRY_POINT).with_priority(-10),
            PluginDescriptor::new("tasks", env!("CARGO_PKG_VERSION"), core_tasks::ENTRY_POINT).depends_on("logging"),
        ],
        ..CoreConfig::default()
    }
}
