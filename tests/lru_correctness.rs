#![allow(clippy::unwrap_used, clippy::similar_names, missing_docs)]

use cascache::errors::CacheError;
use cascache::LruCache;

#[test]
fn insert_then_lookup_returns_value() {
    let mut cache: LruCache<u64, String> = LruCache::new(4);

    assert!(cache.insert(1, "one".to_owned()));

    assert_eq!(cache.lookup(&1), Some("one".to_owned()));
}

#[test]
fn lookup_miss_has_no_side_effect() {
    let mut cache: LruCache<u64, String> = LruCache::new(4);
    cache.insert(1, "one".to_owned());

    assert_eq!(cache.lookup(&2), None);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn len_never_exceeds_capacity() {
    let mut cache: LruCache<u64, u64> = LruCache::new(4);

    for i in 0..64 {
        assert!(cache.insert(i, i * 10));
        assert!(cache.len() <= cache.capacity(), "len exceeded capacity at insert {i}");
    }

    assert_eq!(cache.len(), 4);
}

#[test]
fn lookup_promotes_entry_before_eviction() {
    // Capacity 3: insert a, b, c; lookup a; insert d. The new LRU entry is
    // b, so b is evicted and a survives.
    let mut cache: LruCache<&str, u32> = LruCache::new(3);
    cache.insert("a", 1);
    cache.insert("b", 2);
    cache.insert("c", 3);

    assert_eq!(cache.lookup(&"a"), Some(1));
    assert!(cache.insert("d", 4));

    assert_eq!(cache.peek(&"b"), None, "b should have been evicted");
    assert_eq!(cache.peek(&"a"), Some(&1));
    assert_eq!(cache.peek(&"c"), Some(&3));
    assert_eq!(cache.peek(&"d"), Some(&4));
}

#[test]
fn eviction_order_follows_recency_then_insertion() {
    let mut cache: LruCache<u64, u64> = LruCache::new(8);
    for i in 0..4 {
        cache.insert(i, i);
    }
    // Refresh 0 and 1; eviction should then take 2, 3, 0, 1.
    cache.lookup(&0);
    cache.lookup(&1);

    let order: Vec<u64> = std::iter::from_fn(|| cache.pop_evictable().map(|(k, _)| k)).collect();

    assert_eq!(order, vec![2, 3, 0, 1]);
}

#[test]
fn overwrite_promotes_and_preserves_pin() {
    let mut cache: LruCache<&str, u32> = LruCache::new(3);
    cache.insert("a", 1);
    assert_eq!(cache.pin(&"a"), Some(1));
    cache.insert("b", 2);
    cache.insert("c", 3);

    assert!(cache.insert("a", 10));

    assert_eq!(cache.peek(&"a"), Some(&10));
    assert_eq!(cache.pin_count(&"a"), Some(1));
    // Overwrite must not have grown the cache.
    assert_eq!(cache.len(), 3);
}

#[test]
fn eviction_skips_pinned_entries() {
    let mut cache: LruCache<&str, u32> = LruCache::new(3);
    cache.insert("a", 1);
    cache.insert("b", 2);
    cache.insert("c", 3);
    // a is the LRU entry but pinned; the sweep must take b instead.
    assert_eq!(cache.pin(&"a"), Some(1));

    assert!(cache.insert("d", 4));

    assert_eq!(cache.peek(&"a"), Some(&1));
    assert_eq!(cache.peek(&"b"), None);
}

#[test]
fn insert_fails_without_mutation_when_all_pinned() {
    let mut cache: LruCache<&str, u32> = LruCache::new(2);
    cache.insert("a", 1);
    cache.insert("b", 2);
    cache.pin(&"a");
    cache.pin(&"b");

    assert!(!cache.insert("c", 3));

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.peek(&"a"), Some(&1));
    assert_eq!(cache.peek(&"b"), Some(&2));
    assert_eq!(cache.peek(&"c"), None);
}

#[test]
fn forget_absent_key_is_a_noop() {
    let mut cache: LruCache<u64, u64> = LruCache::new(4);
    cache.insert(1, 1);

    assert!(!cache.forget(&2));
    assert!(!cache.forget(&2), "repeated forget stays false");

    assert_eq!(cache.len(), 1);
}

#[test]
fn forget_removes_pinned_entries_too() {
    let mut cache: LruCache<u64, u64> = LruCache::new(4);
    cache.insert(1, 1);
    cache.pin(&1);

    assert!(cache.forget(&1));

    assert!(cache.is_empty());
}

#[test]
fn slot_reuse_after_forget() {
    // Freed arena slots are recycled; churn through many more keys than the
    // capacity and verify lookups stay correct.
    let mut cache: LruCache<u64, u64> = LruCache::new(4);
    for i in 0..100 {
        cache.insert(i, i + 1000);
        if i % 3 == 0 {
            cache.forget(&i);
        }
    }
    for i in 96..100 {
        if i % 3 == 0 {
            assert_eq!(cache.peek(&i), None);
        } else {
            assert_eq!(cache.peek(&i), Some(&(i + 1000)));
        }
    }
}

#[test]
fn pin_absent_key_returns_none() {
    let mut cache: LruCache<u64, u64> = LruCache::new(4);

    assert_eq!(cache.pin(&1), None);
}

#[test]
fn pin_counts_nest() {
    let mut cache: LruCache<u64, u64> = LruCache::new(4);
    cache.insert(1, 1);

    assert_eq!(cache.pin(&1), Some(1));
    assert_eq!(cache.pin(&1), Some(2));
    assert_eq!(cache.unpin(&1).unwrap(), 1);
    assert_eq!(cache.unpin(&1).unwrap(), 0);
}

#[test]
fn unpin_without_pin_is_invalid_state() {
    let mut cache: LruCache<u64, u64> = LruCache::new(4);
    cache.insert(1, 1);

    let err = cache.unpin(&1).unwrap_err();

    assert!(matches!(err, CacheError::InvalidState));
    // The count was not clamped to a bogus value; pinning still works.
    assert_eq!(cache.pin(&1), Some(1));
}

#[test]
fn unpin_absent_key_is_not_found() {
    let mut cache: LruCache<u64, u64> = LruCache::new(4);

    assert!(matches!(cache.unpin(&1), Err(CacheError::NotFound)));
}

#[test]
fn purge_retains_pinned_entries() {
    let mut cache: LruCache<u64, u64> = LruCache::new(8);
    for i in 0..6 {
        cache.insert(i, i);
    }
    cache.pin(&2);
    cache.pin(&4);

    cache.purge();

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.peek(&2), Some(&2));
    assert_eq!(cache.peek(&4), Some(&4));
}

#[test]
fn stats_track_operations() {
    let mut cache: LruCache<u64, u64> = LruCache::new(2);
    cache.insert(1, 1);
    cache.insert(2, 2);
    cache.insert(3, 3); // evicts 1

    cache.lookup(&2); // hit
    cache.lookup(&1); // miss

    let stats = cache.stats();
    assert_eq!(stats.inserts, 3);
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}
