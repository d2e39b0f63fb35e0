// =============================================================================
// TTL Cache — provider responses keyed by request
// =============================================================================
//
// Entries older than the TTL are no longer returned by `get`, but stay in the
// map so a failing provider can still be answered from `get_stale`.
// `purge_expired` drops entries older than the retention window, which is
// never shorter than the TTL.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Hit/miss counters reported on the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
}

pub struct TtlCache<V> {
    ttl: Duration,
    retention: Duration,
    entries: RwLock<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_retention(ttl, ttl)
    }

    /// Keep expired entries around for stale reads until `retention`.
    pub fn with_retention(ttl: Duration, retention: Duration) -> Self {
        Self {
            ttl,
            retention: retention.max(ttl),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Value for `key` if it was stored less than one TTL ago.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Value for `key` regardless of age.
    pub fn get_stale(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).map(|e| e.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.write().insert(
            key.into(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys: self.len(),
        }
    }

    /// Drop entries past the retention window, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.retention);
        before - entries.len()
    }
}
