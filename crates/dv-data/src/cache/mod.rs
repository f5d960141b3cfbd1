//! Keyed caching of remote map instantiations and responses

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::Serialize;

/// Default number of entries kept by a cache
pub const DEFAULT_CACHE_ENTRIES: usize = 64;

/// Cache keyed by the serialized form of a request
pub struct KeyedCache<V> {
    entries: Arc<RwLock<AHashMap<String, (u64, V)>>>,
    /// Insertion counter used to find the oldest entry
    clock: Arc<RwLock<u64>>,
    max_entries: usize,
}

impl<V: Clone> KeyedCache<V> {
    /// Create a new cache
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(AHashMap::new())),
            clock: Arc::new(RwLock::new(0)),
            max_entries: max_entries.max(1),
        }
    }

    /// Cache key of a serializable request
    pub fn key_for<K: Serialize>(request: &K) -> String {
        serde_json::to_string(request).unwrap_or_default()
    }

    /// Get an entry from cache
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).map(|(_, value)| value.clone())
    }

    /// Put an entry in cache, evicting the oldest one when at capacity
    pub fn put(&self, key: String, value: V) {
        let stamp = {
            let mut clock = self.clock.write();
            *clock += 1;
            *clock
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stamp, _))| *stamp)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(key, (stamp, value));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<V: Clone> Default for KeyedCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_ENTRIES)
    }
}
