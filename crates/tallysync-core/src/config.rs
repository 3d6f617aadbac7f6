//! Data layer configuration.
//!
//! Holds the per-resource TTLs, the filter debounce delay and the request
//! cache bound, plus the API base URL and the last signed-in user.
//!
//! Configuration is stored at `~/.config/tallysync/config.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cache::store::encode_file_name;
use crate::models::ResourceKind;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tallysync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Dashboard figures change slowly relative to how often the page remounts.
const DASHBOARD_TTL_MS: u64 = 60_000;

const TRANSACTIONS_TTL_MS: u64 = 30_000;

/// Quiet period after the last filter edit before a fetch is issued.
const DEBOUNCE_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub storage_prefix: String,
    /// TTL in milliseconds per resource name. Missing or `0` means every
    /// check fetches.
    pub ttl_ms: HashMap<String, u64>,
    pub debounce_ms: u64,
    pub max_cache_entries: usize,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub last_user: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let ttl_ms = [
            (ResourceKind::DashboardSummary, DASHBOARD_TTL_MS),
            (ResourceKind::DashboardAnalytics, DASHBOARD_TTL_MS),
            (ResourceKind::Transactions, TRANSACTIONS_TTL_MS),
            (ResourceKind::Clients, 0),
        ]
        .into_iter()
        .map(|(kind, ms)| (kind.name().to_string(), ms))
        .collect();

        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            storage_prefix: APP_NAME.to_string(),
            ttl_ms,
            debounce_ms: DEBOUNCE_MS,
            max_cache_entries: 256,
            page_size: 20,
            request_timeout_secs: 30,
            last_user: None,
        }
    }
}

impl SyncConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Cache directory, scoped to the last signed-in user so one user's
    /// snapshots are never bootstrapped into another's session.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        Ok(self.cache_dir_in(&cache_dir))
    }

    /// `<base>/tallysync[/<user>]`. The user name is encoded to a single
    /// path component.
    pub fn cache_dir_in(&self, base: &Path) -> PathBuf {
        let path = base.join(APP_NAME);
        match self.last_user.as_deref() {
            Some(user) if !user.is_empty() => path.join(encode_file_name(user)),
            _ => path,
        }
    }

    pub fn ttl(&self, kind: ResourceKind) -> Duration {
        Duration::from_millis(self.ttl_ms.get(kind.name()).copied().unwrap_or(0))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let config = SyncConfig::default();
        assert_eq!(config.ttl(ResourceKind::DashboardSummary), Duration::from_secs(60));
        assert_eq!(config.ttl(ResourceKind::Transactions), Duration::from_secs(30));
        assert_eq!(config.ttl(ResourceKind::Clients), Duration::ZERO);
        assert_eq!(config.debounce(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"api_base_url": "https://books.example.com/api", "debounce_ms": 250}"#)
                .unwrap();
        assert_eq!(config.api_base_url, "https://books.example.com/api");
        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.page_size, 20);
        // Missing ttl table keeps the default per-resource TTLs.
        assert_eq!(config.ttl(ResourceKind::DashboardSummary), Duration::from_secs(60));
    }

    #[test]
    fn test_cache_dir_is_scoped_to_user() {
        let base = Path::new("/var/cache");
        let mut config = SyncConfig::default();
        assert_eq!(config.cache_dir_in(base), base.join("tallysync"));

        config.last_user = Some("jane".to_string());
        assert_eq!(config.cache_dir_in(base), base.join("tallysync").join("jane"));
    }

    #[test]
    fn test_cache_dir_user_cannot_escape() {
        let base = Path::new("/var/cache");
        let config = SyncConfig {
            last_user: Some("../x".to_string()),
            ..SyncConfig::default()
        };
        let dir = config.cache_dir_in(base);
        assert_eq!(dir.parent(), Some(base.join("tallysync").as_path()));
        assert_eq!(dir.file_name().and_then(|n| n.to_str()), Some("%2E%2E%2Fx"));
    }
}
