//! Bounded decision cache
//!
//! Small LRU-evicting cache used by the origin validator so repeated requests
//! from the same frontend skip the whitelist scan. Staleness is only a
//! concern across whitelist mutations, which call [`BoundedCache::clear`];
//! there is no TTL.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
};

use serde::Serialize;

/// Thread-safe map with capacity-based LRU eviction.
pub struct BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    capacity: usize,
    entries: RwLock<HashMap<K, V>>,
    /// Least recently used first. Guarded separately; both locks are only
    /// ever taken write-then-write in `put`, so there is no ordering hazard.
    recency: RwLock<Vec<K>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            recency: RwLock::new(Vec::with_capacity(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let found = match self.entries.read() {
            Ok(entries) => entries.get(key).cloned(),
            Err(_) => None,
        };

        match found {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.touch(key);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: K, value: V) {
        let (Ok(mut entries), Ok(mut recency)) = (self.entries.write(), self.recency.write())
        else {
            return;
        };

        while entries.len() >= self.capacity && !entries.contains_key(&key) {
            let Some(oldest) = recency.first().cloned() else {
                break;
            };
            entries.remove(&oldest);
            recency.retain(|k| k != &oldest);
        }

        entries.insert(key.clone(), value);
        recency.retain(|k| k != &key);
        recency.push(key);
    }

    /// Drop every entry. Called whenever the data the cached decisions were
    /// derived from changes.
    pub fn clear(&self) {
        if let (Ok(mut entries), Ok(mut recency)) = (self.entries.write(), self.recency.write()) {
            entries.clear();
            recency.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.capacity,
            size: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn touch(&self, key: &K) {
        if let Ok(mut recency) = self.recency.write() {
            recency.retain(|k| k != key);
            recency.push(key.clone());
        }
    }
}

/// Snapshot of cache occupancy and effectiveness.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}
