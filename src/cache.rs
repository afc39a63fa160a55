//! Entity caches.
//!
//! [`LruCache`] is the built-in memoisation policy: a bounded map evicting
//! the least-recently-used entry, with hit/miss/switch counters for
//! diagnostics. It is a pure data structure; fetching on miss is the
//! loader's job, not the cache's.
//!
//! [`PutCache`] is the put-through alternative: any thread-safe map with
//! `get`/`put` can be registered per entity kind, and the loader populates
//! it after a miss.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Caller-controlled cache the loader queries and populates.
///
/// Eviction policy, sizing and interior locking are the implementation's
/// concern.
pub trait PutCache<K, V>: Send + Sync {
    /// Look up a cached value.
    fn get(&self, key: &K) -> Option<V>;
    /// Store a value after a miss.
    fn put(&self, key: K, value: V);
}

/// Point-in-time counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that fell through to the loader.
    pub misses: u64,
    /// Eviction-or-recency events; a fast-growing tally means thrash.
    pub switches: u64,
    /// Entries currently resident.
    pub len: usize,
    /// Maximum entries.
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups that missed, in `[0, 1]`. Zero before any
    /// lookup.
    pub fn miss_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }
}

const NIL: usize = usize::MAX;

struct Slot<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

struct LruState<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    free: Vec<usize>,
    /// Most recently used.
    head: usize,
    /// Least recently used; evicted first.
    tail: usize,
}

impl<K: Eq + Hash + Clone, V> LruState<K, V> {
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
    }

    fn link_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

/// Bounded least-recently-used cache.
///
/// Recency is advanced by both `get` and `insert`. Interior locking makes
/// it safe for concurrent use; values are cloned out, so `V` is typically
/// an `Arc`.
pub struct LruCache<K, V> {
    state: Mutex<LruState<K, V>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    switches: AtomicU64,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                map: HashMap::with_capacity(capacity.min(1 << 16)),
                slots: Vec::new(),
                free: Vec::new(),
                head: NIL,
                tail: NIL,
            }),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            switches: AtomicU64::new(0),
        }
    }

    /// Look up a key, promoting it to most recently used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        match state.map.get(key).copied() {
            Some(idx) => {
                if state.head != idx {
                    state.unlink(idx);
                    state.link_front(idx);
                    self.switches.fetch_add(1, Ordering::Relaxed);
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(state.slots[idx].value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a value as most recently used, evicting the least recently
    /// used entry when full. Re-inserting an existing key replaces its
    /// value.
    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        if let Some(idx) = state.map.get(&key).copied() {
            state.slots[idx].value = value;
            if state.head != idx {
                state.unlink(idx);
                state.link_front(idx);
                self.switches.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
        if state.map.len() >= self.capacity {
            let victim = state.tail;
            state.unlink(victim);
            let old_key = state.slots[victim].key.clone();
            state.map.remove(&old_key);
            state.free.push(victim);
            self.switches.fetch_add(1, Ordering::Relaxed);
        }
        let idx = match state.free.pop() {
            Some(idx) => {
                state.slots[idx] = Slot {
                    key: key.clone(),
                    value,
                    prev: NIL,
                    next: NIL,
                };
                idx
            }
            None => {
                state.slots.push(Slot {
                    key: key.clone(),
                    value,
                    prev: NIL,
                    next: NIL,
                });
                state.slots.len() - 1
            }
        };
        state.link_front(idx);
        state.map.insert(key, idx);
    }

    /// Drop every entry. Counters are left in place.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.map.clear();
        state.slots.clear();
        state.free.clear();
        state.head = NIL;
        state.tail = NIL;
    }

    /// Entries currently resident.
    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the diagnostic counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            switches: self.switches.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.get(&1); // 2 is now least recent
        cache.insert(3, "c");
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&3), Some("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn get_and_insert_both_promote() {
        let cache = LruCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(1, "a2"); // promote by insert
        cache.insert(3, "c"); // evicts 2
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("a2"));
    }

    #[test]
    fn counters_track_hits_misses_and_switches() {
        let cache = LruCache::new(2);
        assert_eq!(cache.get(&9), None);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.get(&1);
        cache.insert(3, "c");
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        // one recency move + one eviction
        assert_eq!(stats.switches, 2);
        assert!(stats.miss_ratio() > 0.49 && stats.miss_ratio() < 0.51);
    }

    #[test]
    fn hot_working_set_within_capacity_never_misses_after_warmup() {
        let cache = LruCache::new(8);
        for k in 0..8 {
            cache.insert(k, k * 10);
        }
        let before = cache.stats().misses;
        for _ in 0..100 {
            for k in 0..8 {
                assert!(cache.get(&k).is_some());
            }
        }
        assert_eq!(cache.stats().misses, before);
    }

    #[test]
    fn single_entry_cache_cycles() {
        let cache = LruCache::new(1);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("b"));
    }
}
