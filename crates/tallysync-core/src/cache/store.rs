use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::ResourceKind;

/// Collections are mirrored here as `<key>.json`.
const DATA_DIR: &str = "data";

/// Last active tab per page. Survives logout.
const UI_DIR: &str = "ui";

/// Storage key for a resource's collection, e.g. `tallysync_clients_data`.
pub fn storage_key(prefix: &str, kind: ResourceKind) -> String {
    format!("{}_{}_data", prefix, kind.name())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Includes negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Durable mirror of in-memory collections.
///
/// The store is advisory: it only ever bootstraps a page. Reads never fail
/// (a missing or unreadable snapshot is an empty one) and an empty
/// collection is never written over a good snapshot.
pub struct PersistentStore {
    dir: PathBuf,
}

impl PersistentStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(dir.join(DATA_DIR))
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        std::fs::create_dir_all(dir.join(UI_DIR))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.dir.join(DATA_DIR).join(format!("{}.json", encode_file_name(key)))
    }

    fn ui_path(&self, page: &str) -> PathBuf {
        self.dir.join(UI_DIR).join(format!("{}_tab.json", encode_file_name(page)))
    }

    /// Write `items` under `key`. Returns `Ok(false)` without touching the
    /// existing snapshot when `items` is empty.
    pub fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<bool> {
        if items.is_empty() {
            debug!(key = key, "Empty collection not persisted");
            return Ok(false);
        }

        let cached = CachedData::new(items);
        let contents = serde_json::to_string(&cached)
            .with_context(|| format!("Failed to serialize snapshot: {}", key))?;
        let path = self.data_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write snapshot: {}", key))?;
        debug!(key = key, count = items.len(), "Snapshot persisted");
        Ok(true)
    }

    /// The snapshot under `key` with its timestamp, if it exists and parses.
    pub fn load_cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<Vec<T>>>> {
        let path = self.data_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot: {}", key))?;
        let cached: CachedData<Vec<T>> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse snapshot: {}", key))?;
        Ok(Some(cached))
    }

    /// Items stored under `key`, or empty if there are none or they cannot
    /// be read. Failures are logged, never returned.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        match self.load_cached(key) {
            Ok(Some(cached)) => cached.data,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key = key, error = %e, "Discarding unreadable snapshot");
                Vec::new()
            }
        }
    }

    /// Remove the snapshot under `key`. Removing a missing snapshot is not an error.
    pub fn clear(&self, key: &str) -> Result<()> {
        let path = self.data_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(key = key, "Snapshot cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove snapshot: {}", key)),
        }
    }

    /// Remove every collection snapshot. UI tab state is kept.
    pub fn clear_all(&self) -> Result<()> {
        let data_dir = self.dir.join(DATA_DIR);
        match std::fs::remove_dir_all(&data_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("Failed to clear snapshots"),
        }
        std::fs::create_dir_all(&data_dir)?;
        debug!(dir = %self.dir.display(), "All snapshots cleared");
        Ok(())
    }

    /// "5m ago" style age of the snapshot under `key`.
    pub fn age(&self, key: &str) -> Option<String> {
        match self.load_cached::<serde_json::Value>(key) {
            Ok(Some(cached)) => Some(cached.age_display()),
            Ok(None) => None,
            Err(e) => {
                debug!(key = key, error = %e, "Failed to load snapshot for age display");
                None
            }
        }
    }

    pub fn save_active_tab(&self, page: &str, tab: &str) -> Result<()> {
        let contents = serde_json::to_string(tab)?;
        std::fs::write(self.ui_path(page), contents)
            .with_context(|| format!("Failed to write active tab for {}", page))?;
        Ok(())
    }

    pub fn load_active_tab(&self, page: &str) -> Option<String> {
        let contents = std::fs::read_to_string(self.ui_path(page)).ok()?;
        match serde_json::from_str(&contents) {
            Ok(tab) => Some(tab),
            Err(e) => {
                debug!(page = page, error = %e, "Ignoring unreadable tab state");
                None
            }
        }
    }
}

/// Encode `key` as a single path component. ASCII letters, digits, `-`
/// and `_` pass through; every other byte becomes `%XX`, so distinct keys
/// never share a file.
pub(crate) fn encode_file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name
}
