use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::BusConfig;
use crate::kernel::constants;
use crate::plugin_system::PluginDescriptor;
use crate::storage::error::StorageSystemError;
use crate::utils::fs::write_atomic;

type Result<T> = std::result::Result<T, StorageSystemError>;

/// Supported configuration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }
}

/// Resolution cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of memoized descriptor sets
    pub capacity: usize,
    /// JSON file backing the cache; in-memory only when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_CACHE_CAPACITY,
            path: None,
        }
    }
}

/// Everything the lifecycle controller needs to come up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub shutdown_grace_ms: u64,
    pub execute_timeout_ms: u64,
    pub bus: BusConfig,
    pub cache: CacheConfig,
    /// Plugin descriptors, in no particular order
    pub plugins: Vec<PluginDescriptor>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: constants::DEFAULT_SHUTDOWN_GRACE_MS,
            execute_timeout_ms: constants::DEFAULT_EXECUTE_TIMEOUT_MS,
            bus: BusConfig::default(),
            cache: CacheConfig::default(),
            plugins: Vec::new(),
        }
    }
}

impl CoreConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_millis(self.execute_timeout_ms)
    }

    /// Look up a configured descriptor by id
    pub fn plugin(&self, id: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|d| d.id == id)
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> Result<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(|e| serialization_error("JSON", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| serialization_error("YAML", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| serialization_error("TOML", e)),
        }
    }

    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(data).map_err(|e| deserialization_error("JSON", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| deserialization_error("YAML", e)),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| deserialization_error("TOML", e)),
        }
    }

    /// Load a configuration file, picking the format from its extension
    pub fn load(path: &Path) -> Result<Self> {
        let format = format_of(path)?;
        let data = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageSystemError::FileNotFound(path.to_path_buf()),
            _ => StorageSystemError::io(e, "read_config", path.to_path_buf()),
        })?;
        let config = Self::deserialize(&data, format)?;
        log::info!(
            "Loaded configuration from {} ({} plugin descriptor(s))",
            path.display(),
            config.plugins.len()
        );
        Ok(config)
    }

    /// Write the configuration atomically in the format implied by `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.serialize(format_of(path)?)?;
        write_atomic(path, data.as_bytes()).map_err(|e| StorageSystemError::io(e, "write_config", path.to_path_buf()))
    }
}

fn format_of(path: &Path) -> Result<ConfigFormat> {
    ConfigFormat::from_path(path).ok_or_else(|| StorageSystemError::UnsupportedConfigFormat(path.display().to_string()))
}

fn serialization_error(format: &str, e: impl std::error::Error + Send + Sync + 'static) -> StorageSystemError {
    StorageSystemError::SerializationError {
        format: format.to_string(),
        source: Box::new(e),
    }
}

fn deserialization_error(format: &str, e: impl std::error::Error + Send + Sync + 'static) -> StorageSystemError {
    StorageSystemError::DeserializationError {
        format: format.to_string(),
        source: Box::new(e),
    }
}
