//! Generic capacity-bounded LRU cache with per-entry pinning.
//!
//! The recency order is kept in a doubly-linked list threaded through an
//! arena of slots addressed by stable integer indices, with a hash map from
//! keys to slot indices. Freed slots go onto a free list and are reused, so
//! no entry ever moves and no raw pointers are involved.
//!
//! The engine itself is single-threaded (`&mut self` operations); the
//! specializations in this crate wrap an instance in a `Mutex` and hold the
//! lock for the full duration of each operation.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::errors::CacheError;

/// Sentinel index terminating the recency list.
const NIL: usize = usize::MAX;

/// Operation counters, cheap enough to maintain unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    /// Entries with a non-zero pin count are never selected for eviction.
    pins: u32,
    /// Neighbor toward the most-recently-used end.
    prev: usize,
    /// Neighbor toward the least-recently-used end.
    next: usize,
}

/// A bounded associative cache with strict LRU eviction and pinning.
///
/// The stored key is compared in full on every lookup; a hash collision
/// between distinct keys can therefore never return the wrong value.
#[derive(Debug)]
pub struct LruCache<K, V> {
    slots: Vec<Option<Slot<K, V>>>,
    free: Vec<usize>,
    index: FxHashMap<K, usize>,
    /// Most-recently-used slot, or `NIL` when empty.
    head: usize,
    /// Least-recently-used slot, or `NIL` when empty.
    tail: usize,
    capacity: usize,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: FxHashMap::default(),
            head: NIL,
            tail: NIL,
            capacity,
            stats: CacheStats::default(),
        }
    }

    fn slot(&self, idx: usize) -> &Slot<K, V> {
        match &self.slots[idx] {
            Some(slot) => slot,
            None => unreachable!("recency list references a free slot"),
        }
    }

    fn slot_mut(&mut self, idx: usize) -> &mut Slot<K, V> {
        match &mut self.slots[idx] {
            Some(slot) => slot,
            None => unreachable!("recency list references a free slot"),
        }
    }

    /// Detaches `idx` from the recency list without freeing its slot.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = self.slot(idx);
            (slot.prev, slot.next)
        };
        if prev == NIL {
            self.head = next;
        } else {
            self.slot_mut(prev).next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slot_mut(next).prev = prev;
        }
    }

    /// Attaches `idx` at the most-recently-used end.
    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let slot = self.slot_mut(idx);
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head != NIL {
            self.slot_mut(old_head).prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    /// Detaches and frees `idx`, returning the slot contents.
    fn take(&mut self, idx: usize) -> Slot<K, V> {
        self.unlink(idx);
        let slot = match self.slots[idx].take() {
            Some(slot) => slot,
            None => unreachable!("recency list references a free slot"),
        };
        self.free.push(idx);
        self.index.remove(&slot.key);
        slot
    }

    fn alloc(&mut self, slot: Slot<K, V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    /// Inserts or overwrites `key`.
    ///
    /// An overwrite keeps the existing pin count and promotes the entry. A
    /// fresh insert at capacity first evicts the least-recently-used unpinned
    /// entry; if every entry is pinned the insert fails and returns `false`
    /// without mutating the cache.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if let Some(&idx) = self.index.get(&key) {
            self.slot_mut(idx).value = value;
            self.promote(idx);
            self.stats.inserts += 1;
            return true;
        }

        if self.len() == self.capacity && self.pop_evictable().is_none() {
            return false;
        }

        let idx = self.alloc(Slot {
            key: key.clone(),
            value,
            pins: 0,
            prev: NIL,
            next: NIL,
        });
        self.index.insert(key, idx);
        self.push_front(idx);
        self.stats.inserts += 1;
        true
    }

    /// Returns a copy of the value for `key` and promotes the entry to
    /// most-recently-used. A miss has no side effect beyond statistics.
    pub fn lookup(&mut self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        if let Some(&idx) = self.index.get(key) {
            self.promote(idx);
            self.stats.hits += 1;
            Some(self.slot(idx).value.clone())
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Observes the value for `key` without touching recency or statistics.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.slot(idx).value)
    }

    /// Removes `key` regardless of its pin count. An explicit caller
    /// decision, distinct from automatic eviction.
    pub fn forget(&mut self, key: &K) -> bool {
        if let Some(&idx) = self.index.get(key) {
            self.take(idx);
            true
        } else {
            false
        }
    }

    /// Increments the pin count, returning the new count, or `None` when the
    /// key is absent.
    pub fn pin(&mut self, key: &K) -> Option<u32> {
        let idx = *self.index.get(key)?;
        let slot = self.slot_mut(idx);
        slot.pins += 1;
        Some(slot.pins)
    }

    /// Decrements the pin count, returning the new count.
    ///
    /// Fails with [`CacheError::NotFound`] when the key is absent and with
    /// [`CacheError::InvalidState`] when the pin count is already zero; the
    /// count is never silently clamped.
    pub fn unpin(&mut self, key: &K) -> Result<u32, CacheError> {
        let idx = *self.index.get(key).ok_or(CacheError::NotFound)?;
        let slot = self.slot_mut(idx);
        if slot.pins == 0 {
            return Err(CacheError::InvalidState);
        }
        slot.pins -= 1;
        Ok(slot.pins)
    }

    /// Returns the pin count for `key`, or `None` when absent.
    #[must_use]
    pub fn pin_count(&self, key: &K) -> Option<u32> {
        self.index.get(key).map(|&idx| self.slot(idx).pins)
    }

    /// Removes and returns the least-recently-used unpinned entry.
    ///
    /// Scans from the cold end of the recency list, skipping pinned slots.
    /// Returns `None` when every entry is pinned (or the cache is empty).
    pub fn pop_evictable(&mut self) -> Option<(K, V)> {
        let mut idx = self.tail;
        while idx != NIL {
            let (pins, prev) = {
                let slot = self.slot(idx);
                (slot.pins, slot.prev)
            };
            if pins == 0 {
                let slot = self.take(idx);
                self.stats.evictions += 1;
                return Some((slot.key, slot.value));
            }
            idx = prev;
        }
        None
    }

    /// Removes every unpinned entry; pinned entries are retained.
    pub fn purge(&mut self) {
        while self.pop_evictable().is_some() {}
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
