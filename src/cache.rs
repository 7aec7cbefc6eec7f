//! Optional bounded cache of recently decoded entries.

use std::collections::{HashMap, VecDeque};

struct CacheEntry<K, V> {
    key: K,
    value: V,
    expire_at: u64,
}

/// A bounded most-recently-used mapping from encoded key bytes to decoded
/// entries, consulted on reads and updated on reads and writes. Purely an
/// accelerator: the map invalidates entries on delete/expire/clear, and
/// expired hits are ignored so TTL semantics stay with the map.
///
/// Keyed by encoded key bytes rather than K so no Eq/Hash bounds leak onto
/// the map's key type.
pub struct HotCache<K, V> {
    capacity: usize,
    entries: HashMap<Vec<u8>, CacheEntry<K, V>>,
    order: VecDeque<Vec<u8>>,
}

impl<K, V> HotCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self { capacity, entries: HashMap::with_capacity(capacity), order: VecDeque::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry, marking it most recently used. `now_ms` filters
    /// hits past their expiry; those are left for the map's probe to reap.
    pub fn get(&mut self, key_bytes: &[u8], now_ms: u64) -> Option<(&K, &V)> {
        let entry = self.entries.get(key_bytes)?;
        if entry.expire_at != 0 && now_ms > entry.expire_at {
            return None;
        }
        self.touch(key_bytes);
        let entry = &self.entries[key_bytes];
        Some((&entry.key, &entry.value))
    }

    /// Inserts or replaces an entry, returning the evicted entry if the
    /// cache was full.
    pub fn insert(&mut self, key_bytes: Vec<u8>, key: K, value: V, expire_at: u64) -> Option<(K, V)> {
        if self.entries.insert(key_bytes.clone(), CacheEntry { key, value, expire_at }).is_some() {
            self.touch(&key_bytes);
            return None;
        }
        self.order.push_back(key_bytes);
        if self.entries.len() <= self.capacity {
            return None;
        }
        // Oldest first; positions for entries removed out-of-band were
        // already dropped from the order queue.
        while let Some(oldest) = self.order.pop_front() {
            if let Some(entry) = self.entries.remove(&oldest) {
                return Some((entry.key, entry.value));
            }
        }
        None
    }

    /// Drops an entry, if cached.
    pub fn remove(&mut self, key_bytes: &[u8]) {
        if self.entries.remove(key_bytes).is_some() {
            self.order.retain(|k| k != key_bytes);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, key_bytes: &[u8]) {
        if let Some(pos) = self.order.iter().position(|k| k == key_bytes) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = HotCache::new(2);
        assert!(cache.insert(b"a".to_vec(), "a", 1, 0).is_none());
        assert!(cache.insert(b"b".to_vec(), "b", 2, 0).is_none());

        // Touch "a" so "b" is the eviction candidate.
        assert_eq!(cache.get(b"a", 0), Some((&"a", &1)));
        let evicted = cache.insert(b"c".to_vec(), "c", 3, 0);
        assert_eq!(evicted, Some(("b", 2)));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(b"b", 0).is_none());
        assert_eq!(cache.get(b"a", 0), Some((&"a", &1)));
    }

    #[test]
    fn replacing_does_not_evict() {
        let mut cache = HotCache::new(2);
        cache.insert(b"a".to_vec(), "a", 1, 0);
        cache.insert(b"b".to_vec(), "b", 2, 0);
        assert!(cache.insert(b"a".to_vec(), "a", 10, 0).is_none());
        assert_eq!(cache.get(b"a", 0), Some((&"a", &10)));
    }

    #[test]
    fn expired_hits_miss() {
        let mut cache = HotCache::new(2);
        cache.insert(b"a".to_vec(), "a", 1, 100);
        assert_eq!(cache.get(b"a", 100), Some((&"a", &1)));
        assert!(cache.get(b"a", 101).is_none());
    }

    #[test]
    fn remove_and_clear() {
        let mut cache = HotCache::new(2);
        cache.insert(b"a".to_vec(), "a", 1, 0);
        cache.remove(b"a");
        assert!(cache.get(b"a", 0).is_none());
        cache.insert(b"b".to_vec(), "b", 2, 0);
        cache.clear();
        assert!(cache.is_empty());
    }
}
