use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn default_enabled() -> bool {
    true
}

/// Static description of a plugin, produced by configuration or discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin id
    pub id: String,
    /// Semantic version string
    pub version: String,
    /// Ids of plugins that must be loaded first
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Key of the factory in the [`PluginCatalog`](crate::plugin_system::PluginCatalog)
    pub entry_point: String,
    /// Lower values load earlier among plugins whose dependencies are satisfied
    #[serde(default)]
    pub priority: i32,
    /// Disabled plugins are known to the manager but stay Unloaded
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Opaque revision of the plugin's code (e.g. a build hash)
    #[serde(default)]
    pub code_revision: String,
}

impl PluginDescriptor {
    pub fn new(id: &str, version: &str, entry_point: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            dependencies: BTreeSet::new(),
            entry_point: entry_point.to_string(),
            priority: 0,
            enabled: true,
            code_revision: String::new(),
        }
    }

    /// Add a dependency on another plugin id
    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.insert(id.to_string());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_code_revision(mut self, revision: &str) -> Self {
        self.code_revision = revision.to_string();
        self
    }

    /// SHA-256 over every field that can influence loading, as lowercase hex.
    ///
    /// The `enabled` flag is excluded: toggling a plugin does not change the
    /// dependency graph.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.version.as_bytes());
        hasher.update([0u8]);
        for dep in &self.dependencies {
            hasher.update(dep.as_bytes());
            hasher.update([1u8]);
        }
        hasher.update([0u8]);
        hasher.update(self.entry_point.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.priority.to_le_bytes());
        hasher.update(self.code_revision.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.id, self.version)
    }
}
