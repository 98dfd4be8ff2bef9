//! Byte-quota accounting and LRU eviction policy for the object store.
//!
//! The manager owns the ledger (running byte total plus recency order over
//! all registered objects) and nothing else: it decides *which* objects to
//! evict and hands the victim digests back to the caller, which owns the
//! backing files and unlinks them outside the ledger lock.
//!
//! Eviction is caller-triggered draining: the same `insert` that pushes the
//! total over the high-water mark synchronously sweeps least-recently-used
//! unpinned objects until the total is back under the low-water mark. There
//! is no background poller thread.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::cache::lru::LruCache;
use crate::digest::Digest;
use crate::errors::CacheError;

/// Where the ledger stands relative to the watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaState {
    /// Total at or under the high-water mark.
    Normal,
    /// Total above the high-water mark and the last sweep could not fix it
    /// because every remaining object is pinned. Cleared by a future sweep
    /// once enough objects are unpinned.
    OverQuota,
    /// A sweep is in progress.
    Draining,
}

/// Snapshot of the ledger, serializable for the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStats {
    pub total_bytes: u64,
    pub pinned_bytes: u64,
    pub entry_count: usize,
    pub high_water: u64,
    pub low_water: u64,
    pub evictions: u64,
}

struct Ledger {
    /// Recency order and per-object sizes. Entry capacity is effectively
    /// unbounded; the byte watermarks are the real limit.
    entries: LruCache<Digest, u64>,
    /// Sum of sizes of all registered objects. Always equals the sum over
    /// `entries`.
    total: u64,
    /// Sum of sizes of objects with a non-zero pin count.
    pinned: u64,
    state: QuotaState,
}

/// Quota-driven eviction manager over a set of content-addressed objects.
pub struct QuotaManager {
    ledger: Mutex<Ledger>,
    high_water: u64,
    low_water: u64,
}

impl QuotaManager {
    /// Creates a manager that starts sweeping above `high_water` bytes and
    /// sweeps down to `low_water` bytes.
    ///
    /// # Panics
    /// Panics if `low_water > high_water`.
    #[must_use]
    pub fn new(high_water: u64, low_water: u64) -> Self {
        assert!(
            low_water <= high_water,
            "low-water mark must not exceed high-water mark"
        );
        Self {
            ledger: Mutex::new(Ledger {
                entries: LruCache::new(usize::MAX),
                total: 0,
                pinned: 0,
                state: QuotaState::Normal,
            }),
            high_water,
            low_water,
        }
    }

    /// Registers a newly cached object of `size` bytes.
    ///
    /// Re-registering a known digest degrades to a recency touch. When the
    /// new total exceeds the high-water mark a synchronous sweep runs before
    /// this call returns; the returned digests are the sweep's victims, which
    /// the caller must unlink from disk.
    ///
    /// Fails with [`CacheError::CapacityUnavailable`] when even a full sweep
    /// could not bring the total under the high-water mark, i.e. when pinned
    /// bytes plus `size` exceed it. The caller must not write such an object
    /// locally.
    pub fn insert(&self, digest: Digest, size: u64) -> Result<Vec<Digest>, CacheError> {
        let mut ledger = self.ledger.lock();

        if ledger.entries.peek(&digest).is_some() {
            let _ = ledger.entries.lookup(&digest);
            return Ok(Vec::new());
        }

        if ledger.pinned.saturating_add(size) > self.high_water {
            return Err(CacheError::CapacityUnavailable {
                size,
                available: self.high_water.saturating_sub(ledger.pinned),
            });
        }

        ledger.entries.insert(digest, size);
        ledger.total += size;

        if ledger.total <= self.high_water {
            return Ok(Vec::new());
        }

        // The entry being inserted is exempt from the sweep it triggers;
        // pin it for the duration of the drain.
        let _ = ledger.entries.pin(&digest);
        let victims = self.sweep_locked(&mut ledger, self.low_water);
        let _ = ledger.entries.unpin(&digest);
        Ok(victims)
    }

    /// Promotes `digest` to most-recently-used. Idempotent; returns `false`
    /// when the digest is not registered.
    pub fn touch(&self, digest: &Digest) -> bool {
        self.ledger.lock().entries.lookup(digest).is_some()
    }

    /// Pins `digest` against eviction. Returns `false` when absent.
    pub fn pin(&self, digest: &Digest) -> bool {
        let mut ledger = self.ledger.lock();
        let Some(&size) = ledger.entries.peek(digest) else {
            return false;
        };
        if ledger.entries.pin(digest) == Some(1) {
            ledger.pinned += size;
        }
        true
    }

    /// Releases one pin on `digest`.
    ///
    /// An unpin without a matching pin is a lifecycle defect in the caller;
    /// it fails with [`CacheError::InvalidState`] and is logged at error
    /// severity instead of being clamped.
    pub fn unpin(&self, digest: &Digest) -> Result<(), CacheError> {
        let mut ledger = self.ledger.lock();
        let size = *ledger.entries.peek(digest).ok_or(CacheError::NotFound)?;
        match ledger.entries.unpin(digest) {
            Ok(0) => {
                ledger.pinned -= size;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err) => {
                error!(%digest, "unpin without matching pin");
                Err(err)
            }
        }
    }

    /// Pins `digest` for the lifetime of the returned guard.
    ///
    /// The guard releases the pin on drop, so every exit path of the caller
    /// (normal return, early return, failure) unpins exactly once.
    pub fn pin_scoped(self: &Arc<Self>, digest: Digest) -> Option<PinGuard> {
        self.pin(&digest).then(|| PinGuard {
            manager: Arc::clone(self),
            digest,
        })
    }

    /// Manual sweep down to `target_bytes`, used by administrative cleanup.
    /// Returns the victim digests for the caller to unlink.
    pub fn evict(&self, target_bytes: u64) -> Vec<Digest> {
        let mut ledger = self.ledger.lock();
        self.sweep_locked(&mut ledger, target_bytes)
    }

    /// Unregisters `digest`, returning its size.
    ///
    /// Fails with [`CacheError::InUse`] when the object is pinned and
    /// [`CacheError::NotFound`] when absent.
    pub fn remove(&self, digest: &Digest) -> Result<u64, CacheError> {
        let mut ledger = self.ledger.lock();
        let size = *ledger.entries.peek(digest).ok_or(CacheError::NotFound)?;
        if ledger.entries.pin_count(digest).unwrap_or(0) > 0 {
            return Err(CacheError::InUse);
        }
        ledger.entries.forget(digest);
        ledger.total -= size;
        Ok(size)
    }

    /// Whether `digest` is registered. No recency side effect.
    #[must_use]
    pub fn contains(&self, digest: &Digest) -> bool {
        self.ledger.lock().entries.peek(digest).is_some()
    }

    #[must_use]
    pub fn state(&self) -> QuotaState {
        self.ledger.lock().state
    }

    #[must_use]
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    #[must_use]
    pub fn low_water(&self) -> u64 {
        self.low_water
    }

    #[must_use]
    pub fn stats(&self) -> QuotaStats {
        let ledger = self.ledger.lock();
        QuotaStats {
            total_bytes: ledger.total,
            pinned_bytes: ledger.pinned,
            entry_count: ledger.entries.len(),
            high_water: self.high_water,
            low_water: self.low_water,
            evictions: ledger.entries.stats().evictions,
        }
    }

    /// Evicts least-recently-used unpinned objects until the total is at or
    /// under `target`, or no unpinned object remains.
    fn sweep_locked(&self, ledger: &mut Ledger, target: u64) -> Vec<Digest> {
        ledger.state = QuotaState::Draining;
        let mut victims = Vec::new();
        while ledger.total > target {
            let Some((digest, size)) = ledger.entries.pop_evictable() else {
                break;
            };
            ledger.total -= size;
            debug!(%digest, size, total = ledger.total, "evicted object");
            victims.push(digest);
        }
        if ledger.total > self.high_water {
            // Everything left is pinned; report rather than block.
            warn!(
                total = ledger.total,
                pinned = ledger.pinned,
                high_water = self.high_water,
                "quota exceeded: all remaining objects are pinned"
            );
            ledger.state = QuotaState::OverQuota;
        } else {
            ledger.state = QuotaState::Normal;
        }
        victims
    }
}

/// Scoped pin on a quota-managed object; unpins on drop.
pub struct PinGuard {
    manager: Arc<QuotaManager>,
    digest: Digest,
}

impl PinGuard {
    #[must_use]
    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        // The object may have been forcibly forgotten while we held the pin;
        // a missing entry is not a lifecycle error at this point.
        if let Err(CacheError::InvalidState) = self.manager.unpin(&self.digest) {
            error!(digest = %self.digest, "pin guard dropped onto an unpinned entry");
        }
    }
}
