#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::sync::Arc;

use cascache::errors::CacheError;
use cascache::{QuotaManager, QuotaState};
use common::key;

#[test]
fn totals_track_inserts() {
    let quota = QuotaManager::new(1000, 800);

    quota.insert(key("a"), 100).unwrap();
    quota.insert(key("b"), 250).unwrap();

    let stats = quota.stats();
    assert_eq!(stats.total_bytes, 350);
    assert_eq!(stats.entry_count, 2);
    assert_eq!(stats.high_water, 1000);
    assert_eq!(stats.low_water, 800);
}

#[test]
fn crossing_high_water_sweeps_to_low_water() {
    // High 100, low 80: three 40-byte objects total 120, the sweep evicts
    // the first-inserted object and stops at exactly the low-water mark.
    let quota = QuotaManager::new(100, 80);

    assert!(quota.insert(key("a"), 40).unwrap().is_empty());
    assert!(quota.insert(key("b"), 40).unwrap().is_empty());
    let victims = quota.insert(key("c"), 40).unwrap();

    assert_eq!(victims, vec![key("a")]);
    assert_eq!(quota.stats().total_bytes, 80);
    assert!(!quota.contains(&key("a")));
    assert!(quota.contains(&key("b")));
    assert!(quota.contains(&key("c")));
    assert_eq!(quota.state(), QuotaState::Normal);
}

#[test]
fn sweep_evicts_repeatedly_until_under_low_water() {
    let quota = QuotaManager::new(100, 80);

    for label in ["a", "b", "c"] {
        quota.insert(key(label), 30).unwrap();
    }
    let victims = quota.insert(key("d"), 30).unwrap();

    // 120 total: evicting a leaves 90, still above 80; b goes too.
    assert_eq!(victims, vec![key("a"), key("b")]);
    assert_eq!(quota.stats().total_bytes, 60);
}

#[test]
fn touch_promotes_recency() {
    let quota = QuotaManager::new(100, 80);
    quota.insert(key("a"), 40).unwrap();
    quota.insert(key("b"), 40).unwrap();

    assert!(quota.touch(&key("a")));
    let victims = quota.insert(key("c"), 40).unwrap();

    // a was refreshed, so b is the LRU victim.
    assert_eq!(victims, vec![key("b")]);
    assert!(quota.contains(&key("a")));
}

#[test]
fn touch_is_idempotent_and_safe_on_unknown_digests() {
    let quota = QuotaManager::new(100, 80);
    quota.insert(key("a"), 10).unwrap();

    assert!(quota.touch(&key("a")));
    assert!(quota.touch(&key("a")));
    assert!(!quota.touch(&key("ghost")));

    assert_eq!(quota.stats().total_bytes, 10);
}

#[test]
fn reinserting_a_known_digest_is_a_touch() {
    let quota = QuotaManager::new(100, 80);
    quota.insert(key("a"), 40).unwrap();
    quota.insert(key("b"), 40).unwrap();

    assert!(quota.insert(key("a"), 40).unwrap().is_empty());
    let victims = quota.insert(key("c"), 40).unwrap();

    assert_eq!(quota.stats().entry_count, 2);
    assert_eq!(victims, vec![key("b")], "re-insert should have refreshed a");
}

#[test]
fn pinned_objects_survive_sweeps() {
    let quota = QuotaManager::new(100, 80);
    quota.insert(key("a"), 40).unwrap();
    assert!(quota.pin(&key("a")));
    quota.insert(key("b"), 40).unwrap();

    let victims = quota.insert(key("c"), 40).unwrap();

    // a is older than b but pinned; b takes the fall.
    assert_eq!(victims, vec![key("b")]);
    assert!(quota.contains(&key("a")));
}

#[test]
fn all_pinned_insert_is_capacity_unavailable() {
    let quota = QuotaManager::new(100, 80);
    quota.insert(key("a"), 60).unwrap();
    assert!(quota.pin(&key("a")));

    let err = quota.insert(key("b"), 50).unwrap_err();

    assert!(matches!(
        err,
        CacheError::CapacityUnavailable { size: 50, .. }
    ));
    // The limit was not silently exceeded and the ledger is unchanged.
    assert_eq!(quota.stats().total_bytes, 60);
    assert!(!quota.contains(&key("b")));
}

#[test]
fn object_larger_than_quota_is_rejected() {
    let quota = QuotaManager::new(100, 80);

    let err = quota.insert(key("huge"), 150).unwrap_err();

    assert!(matches!(err, CacheError::CapacityUnavailable { .. }));
    assert_eq!(quota.stats().entry_count, 0);
}

#[test]
fn sweep_never_evicts_the_inserted_object() {
    // The 90-byte insert itself triggers the sweep; everything else gets
    // evicted but the new object must survive its own admission.
    let quota = QuotaManager::new(100, 80);
    quota.insert(key("a"), 40).unwrap();

    let victims = quota.insert(key("big"), 90).unwrap();

    assert_eq!(victims, vec![key("a")]);
    assert!(quota.contains(&key("big")));
    assert_eq!(quota.stats().total_bytes, 90);
}

#[test]
fn manual_evict_reaches_arbitrary_targets() {
    let quota = QuotaManager::new(1000, 900);
    for label in ["a", "b", "c", "d", "e"] {
        quota.insert(key(label), 20).unwrap();
    }

    let victims = quota.evict(50);

    assert_eq!(victims, vec![key("a"), key("b"), key("c")]);
    assert_eq!(quota.stats().total_bytes, 40);
    assert_eq!(quota.state(), QuotaState::Normal);
}

#[test]
fn evict_to_zero_spares_pinned_objects() {
    let quota = QuotaManager::new(1000, 900);
    quota.insert(key("a"), 20).unwrap();
    quota.insert(key("b"), 20).unwrap();
    assert!(quota.pin(&key("b")));

    let victims = quota.evict(0);

    assert_eq!(victims, vec![key("a")]);
    assert_eq!(quota.stats().total_bytes, 20);
}

#[test]
fn remove_refuses_pinned_objects() {
    let quota = QuotaManager::new(1000, 900);
    quota.insert(key("a"), 20).unwrap();
    assert!(quota.pin(&key("a")));

    assert!(matches!(quota.remove(&key("a")), Err(CacheError::InUse)));

    quota.unpin(&key("a")).unwrap();
    assert_eq!(quota.remove(&key("a")).unwrap(), 20);
    assert_eq!(quota.stats().total_bytes, 0);
}

#[test]
fn remove_absent_is_not_found() {
    let quota = QuotaManager::new(1000, 900);

    assert!(matches!(quota.remove(&key("a")), Err(CacheError::NotFound)));
}

#[test]
fn unmatched_unpin_is_invalid_state() {
    let quota = QuotaManager::new(1000, 900);
    quota.insert(key("a"), 20).unwrap();
    assert!(quota.pin(&key("a")));
    quota.unpin(&key("a")).unwrap();

    assert!(matches!(
        quota.unpin(&key("a")),
        Err(CacheError::InvalidState)
    ));
    assert!(matches!(
        quota.unpin(&key("ghost")),
        Err(CacheError::NotFound)
    ));
}

#[test]
fn pinned_bytes_follow_pin_lifecycle() {
    let quota = QuotaManager::new(1000, 900);
    quota.insert(key("a"), 30).unwrap();

    assert!(quota.pin(&key("a")));
    assert!(quota.pin(&key("a")), "nested pin");
    assert_eq!(quota.stats().pinned_bytes, 30, "counted once, not per pin");

    quota.unpin(&key("a")).unwrap();
    assert_eq!(quota.stats().pinned_bytes, 30, "still pinned once");
    quota.unpin(&key("a")).unwrap();
    assert_eq!(quota.stats().pinned_bytes, 0);
}

#[test]
fn pin_guard_unpins_on_every_exit_path() {
    let quota = Arc::new(QuotaManager::new(1000, 900));
    quota.insert(key("a"), 20).unwrap();

    {
        let _guard = quota.pin_scoped(key("a")).unwrap();
        assert_eq!(quota.stats().pinned_bytes, 20);
        assert!(matches!(quota.remove(&key("a")), Err(CacheError::InUse)));
    }

    assert_eq!(quota.stats().pinned_bytes, 0);
    assert!(quota.remove(&key("a")).is_ok());
}

#[test]
fn pin_guard_on_unknown_digest_is_none() {
    let quota = Arc::new(QuotaManager::new(1000, 900));

    assert!(quota.pin_scoped(key("ghost")).is_none());
}

#[test]
fn ledger_survives_many_mixed_operations() {
    // Invariant check: total always equals the sum of registered sizes.
    let quota = QuotaManager::new(500, 400);
    let mut expected: std::collections::HashMap<cascache::Digest, u64> =
        std::collections::HashMap::new();

    for i in 0u64..200 {
        let label = format!("obj{}", i % 37);
        let digest = key(&label);
        let size = (i % 7 + 1) * 10;
        match quota.insert(digest, size) {
            Ok(victims) => {
                expected.entry(digest).or_insert(size);
                for victim in victims {
                    expected.remove(&victim);
                }
            }
            Err(CacheError::CapacityUnavailable { .. }) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    let total: u64 = expected.values().sum();
    assert_eq!(quota.stats().total_bytes, total);
    assert_eq!(quota.stats().entry_count, expected.len());
    assert!(quota.stats().total_bytes <= 500);
}
