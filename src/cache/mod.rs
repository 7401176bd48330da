//! In-memory response cache with per-entry TTL.
//!
//! Entries are reclaimed only two ways: lazily, when a read finds them stale,
//! and explicitly, through [`CacheStore::invalidate`] and friends. There is no
//! size bound or LRU policy.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

pub mod key;

pub use key::RequestKey;

/// One cached payload.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Fresh iff `now - stored_at < ttl`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Snapshot of the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    /// Stored keys in sorted order. Stale entries not yet read are included.
    pub keys: Vec<String>,
}

/// Key → entry map with TTL freshness.
///
/// Timestamps come from [`tokio::time::Instant`], so tests can drive expiry
/// with a paused clock.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fetchkit::cache::CacheStore;
///
/// let mut cache = CacheStore::new(Duration::from_secs(60));
/// cache.insert("GET:/categories::null", vec!["chairs", "tables"]);
///
/// assert_eq!(cache.get("GET:/categories::null"), Some(vec!["chairs", "tables"]));
/// assert!(cache.invalidate("GET:/categories::null"));
/// assert_eq!(cache.get("GET:/categories::null"), None);
/// ```
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: HashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the entry's data if present and fresh.
    ///
    /// A present but stale entry is evicted and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = Instant::now();
        let fresh = self.entries.get(key).map(|e| e.is_fresh(now))?;
        if fresh {
            self.entries.get(key).map(|e| e.data.clone())
        } else {
            debug!(key, "evicting stale cache entry");
            self.entries.remove(key);
            None
        }
    }

    /// Stores `data` under `key` with the default TTL.
    pub fn insert(&mut self, key: impl Into<String>, data: V) {
        let ttl = self.default_ttl;
        self.set(key, data, ttl);
    }

    /// Stores `data` under `key` with an explicit TTL, replacing any previous entry.
    pub fn set(&mut self, key: impl Into<String>, data: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                data,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Removes `key`. Returns `true` if an entry was present.
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every key starting with `prefix`. Returns how many were removed.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}
