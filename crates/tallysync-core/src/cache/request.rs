use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::debug;

use crate::models::FilterSnapshot;

/// Used when a cache is configured with a capacity of zero.
const MIN_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

/// Identifies one fetch: resource, filters, page and an optional time
/// bucket (e.g. the current trading date). Anything that changes the
/// response must go into the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: String,
    key: String,
}

impl QueryKey {
    pub fn builder(resource: impl Into<String>) -> QueryKeyBuilder {
        QueryKeyBuilder {
            resource: resource.into(),
            filters: String::new(),
            page: None,
            bucket: None,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

pub struct QueryKeyBuilder {
    resource: String,
    filters: String,
    page: Option<(u32, u32)>,
    bucket: Option<String>,
}

impl QueryKeyBuilder {
    pub fn filters(mut self, filters: &FilterSnapshot) -> Self {
        self.filters = filters.canonical();
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some((page, page_size));
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn build(self) -> QueryKey {
        let mut key = format!("{}?{}", self.resource, self.filters);
        if let Some((page, size)) = self.page {
            key.push_str(&format!("#page={}&size={}", page, size));
        }
        if let Some(bucket) = self.bucket {
            key.push_str(&format!("@{}", bucket));
        }
        QueryKey {
            resource: self.resource,
            key,
        }
    }
}

/// Per-key fetch timestamps with a TTL check.
///
/// Entries are kept in an LRU of bounded size; the oldest key is dropped
/// when a new one would exceed the bound. Timestamps use `tokio::time` so
/// paused test clocks apply.
pub struct RequestCache {
    entries: Mutex<LruCache<QueryKey, Instant>>,
}

impl RequestCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(MIN_CAPACITY);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<QueryKey, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a fetch for `key` is due.
    ///
    /// True when the key has never been fetched, its last fetch is at least
    /// `ttl` old, `ttl` is zero, or `force` is set. A true answer stamps the
    /// key, so a second check inside the window is false even before the
    /// fetch completes.
    pub fn should_fetch(&self, key: &QueryKey, ttl: Duration, force: bool) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();

        if !force && !ttl.is_zero() {
            if let Some(last) = entries.get(key) {
                let age = now.saturating_duration_since(*last);
                if age < ttl {
                    debug!(key = %key, age_ms = age.as_millis() as u64, "Fetch skipped, entry fresh");
                    return false;
                }
            }
        }

        entries.put(key.clone(), now);
        true
    }

    /// Re-stamp `key` after a successful fetch. Other keys are untouched.
    pub fn record_fetch(&self, key: &QueryKey) {
        self.entries().put(key.clone(), Instant::now());
    }

    /// Drop `key` so the next check fetches, e.g. after a failed fetch.
    pub fn forget(&self, key: &QueryKey) {
        self.entries().pop(key);
    }

    /// Drop every key belonging to `resource`.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let mut entries = self.entries();
        let stale: Vec<QueryKey> = entries
            .iter()
            .filter(|(key, _)| key.resource() == resource)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    /// Time since `key` was last stamped.
    pub fn age(&self, key: &QueryKey) -> Option<Duration> {
        self.entries()
            .peek(key)
            .map(|last| Instant::now().saturating_duration_since(*last))
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}
