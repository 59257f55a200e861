use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::plugin_system::dependency::{resolve_load_order, DependencyError};
use crate::plugin_system::descriptor::PluginDescriptor;
use crate::utils::fs::write_atomic;

/// Format version of the persisted cache file
const CACHE_FILE_VERSION: u32 = 1;

/// Memoized resolver output for one descriptor set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub order: Vec<String>,
    /// Fingerprint of every member at computation time
    pub fingerprints: BTreeMap<String, String>,
    pub computed_at: SystemTime,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

/// Counters exposed for status reports and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Every miss runs the resolver exactly once
    pub misses: u64,
    pub entries: usize,
}

fn fingerprints_of(descriptors: &[PluginDescriptor]) -> BTreeMap<String, String> {
    descriptors.iter().map(|d| (d.id.clone(), d.fingerprint())).collect()
}

/// Hash of a descriptor set: ids, versions and fingerprints, independent of input order
pub fn descriptor_set_hash(descriptors: &[PluginDescriptor]) -> String {
    let mut sorted: Vec<&PluginDescriptor> = descriptors.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    let mut hasher = Sha256::new();
    for descriptor in sorted {
        hasher.update(descriptor.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(descriptor.version.as_bytes());
        hasher.update([0u8]);
        hasher.update(descriptor.fingerprint().as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

/// Append/replace-only store of resolution results keyed by descriptor-set hash.
///
/// Reads take a shared lock, writes an exclusive one. The optional backing
/// file is advisory: a missing or unreadable file only forces recomputation.
#[derive(Debug)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
    store_path: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    /// In-memory cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            store_path: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache persisted to `path` as JSON; existing contents are loaded now
    pub fn with_store(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let mut cache = Self::new(capacity);
        let loaded = Self::load_file(&path);
        log::debug!("Loaded {} resolution cache entries from {}", loaded.len(), path.display());
        cache.entries = RwLock::new(loaded);
        cache.store_path = Some(path);
        cache
    }

    fn load_file(path: &Path) -> HashMap<String, CacheEntry> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                log::warn!("Could not read resolution cache {}: {}", path.display(), e);
                return HashMap::new();
            }
        };
        match serde_json::from_str::<CacheFile>(&data) {
            Ok(file) if file.version == CACHE_FILE_VERSION => file.entries.into_iter().collect(),
            Ok(file) => {
                log::warn!("Ignoring resolution cache {} with unsupported version {}", path.display(), file.version);
                HashMap::new()
            }
            Err(e) => {
                log::warn!("Ignoring corrupt resolution cache {}: {}", path.display(), e);
                HashMap::new()
            }
        }
    }

    /// Write `entries` to the backing file; callers hold the write lock
    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        let Some(path) = &self.store_path else { return };
        let file = CacheFile {
            version: CACHE_FILE_VERSION,
            entries: entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        let result = serde_json::to_vec_pretty(&file)
            .map_err(std::io::Error::other)
            .and_then(|bytes| write_atomic(path, &bytes));
        if let Err(e) = result {
            log::warn!("Could not persist resolution cache to {}: {}", path.display(), e);
        }
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cached order for this exact descriptor set, if any
    pub fn lookup(&self, descriptors: &[PluginDescriptor]) -> Option<Vec<String>> {
        let hash = descriptor_set_hash(descriptors);
        let current = fingerprints_of(descriptors);
        {
            let entries = self.entries.read().ok()?;
            let entry = entries.get(&hash)?;
            if entry.fingerprints == current {
                return Some(entry.order.clone());
            }
        }
        log::debug!("Discarding stale resolution cache entry {}", &hash[..12]);
        self.invalidate(&hash);
        None
    }

    /// Return the cached order or run the resolver and store its result
    pub fn get_or_resolve(&self, descriptors: &[PluginDescriptor]) -> Result<Vec<String>, DependencyError> {
        if let Some(order) = self.lookup(descriptors) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Resolution cache hit for {} plugin(s)", descriptors.len());
            return Ok(order);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let order = resolve_load_order(descriptors)?;
        self.insert(descriptors, order.clone());
        log::debug!("Resolved load order: [{}]", order.join(", "));
        Ok(order)
    }

    fn insert(&self, descriptors: &[PluginDescriptor], order: Vec<String>) {
        let hash = descriptor_set_hash(descriptors);
        let entry = CacheEntry {
            order,
            fingerprints: fingerprints_of(descriptors),
            computed_at: SystemTime::now(),
        };
        let mut entries = self.write_entries();
        entries.insert(hash, entry);
        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.computed_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => entries.remove(&key),
                None => break,
            };
        }
        self.persist(&entries);
    }

    /// Drop the entry for one descriptor-set hash; other entries are untouched
    pub fn invalidate(&self, hash: &str) -> bool {
        let mut entries = self.write_entries();
        let removed = entries.remove(hash).is_some();
        if removed {
            self.persist(&entries);
        }
        removed
    }

    /// Drop the entry computed for exactly this descriptor set
    pub fn invalidate_set(&self, descriptors: &[PluginDescriptor]) -> bool {
        self.invalidate(&descriptor_set_hash(descriptors))
    }

    pub fn contains_set(&self, descriptors: &[PluginDescriptor]) -> bool {
        let hash = descriptor_set_hash(descriptors);
        self.entries.read().map(|e| e.contains_key(&hash)).unwrap_or(false)
    }

    pub fn clear(&self) {
        let mut entries = self.write_entries();
        entries.clear();
        self.persist(&entries);
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(crate::kernel::constants::DEFAULT_CACHE_CAPACITY)
    }
}
