//! # Cache store
//! Process-lifetime key/value storage. Entries never expire on their own:
//! freshness is judged by the reader against a TTL, and stale entries stay
//! around as fallback material until overwritten, evicted, or pushed out by
//! the capacity bound (least recently written first).

use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    /// Wall-clock creation time, for reporting.
    pub created_at: DateTime<Utc>,
    /// Set while this entry stands in for a failed refresh.
    pub serving_stale: bool,
    /// Monotonic creation time, for age checks.
    stored_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            serving_stale: false,
            stored_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.stored_at)
    }

    /// Computed on read, never stored.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }
}

/// Storage contract used by [`crate::fallback::CacheFallback`].
pub trait CacheStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry<V>>;
    /// Store a fresh value; clears any stale mark.
    fn set(&self, key: &str, value: V);
    /// Flag an existing entry as serving (or no longer serving) stale data.
    fn mark_stale(&self, key: &str, stale: bool);
    fn evict(&self, key: &str) -> bool;
}

#[derive(Debug)]
pub struct MemoryCache<V> {
    /// Write order: the front entry is the next to go when full.
    inner: RwLock<IndexMap<String, CacheEntry<V>>>,
    capacity: usize,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(IndexMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl<V: Clone + Send + Sync> CacheStore<V> for MemoryCache<V> {
    fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.inner.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: V) {
        let mut map = self.inner.write();
        // Re-inserting moves the key to the back of the write order.
        map.shift_remove(key);
        while map.len() >= self.capacity {
            if let Some((old, _)) = map.shift_remove_index(0) {
                debug!(key = %old, "cache full; dropping oldest entry");
            }
        }
        map.insert(key.to_string(), CacheEntry::new(key, value));
    }

    fn mark_stale(&self, key: &str, stale: bool) {
        if let Some(e) = self.inner.write().get_mut(key) {
            e.serving_stale = stale;
        }
    }

    fn evict(&self, key: &str) -> bool {
        self.inner.write().shift_remove(key).is_some()
    }
}
