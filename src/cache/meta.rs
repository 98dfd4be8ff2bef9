//! In-memory cache of resolved path metadata.
//!
//! Keyed by the md5 fingerprint of the path, this cache short-circuits
//! catalog resolution on the filesystem hot path. A miss means "unknown",
//! never "does not exist": existence must be re-resolved from the catalog,
//! and [`MetaCache::forget_path`] must be called wherever the filesystem
//! layer learns an entry went stale (e.g. after a repository revision
//! change).

use parking_lot::Mutex;

use crate::cache::lru::{CacheStats, LruCache};
use crate::digest::Digest;
use crate::dirent::DirEntry;

/// A fixed-capacity, mutex-guarded lookup cache for [`DirEntry`] records.
///
/// All operations take the internal lock for their full duration and never
/// re-enter, so the type is freely shared across filesystem worker threads.
pub struct MetaCache {
    inner: Mutex<LruCache<Digest, DirEntry>>,
}

impl MetaCache {
    /// Creates a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Inserts or replaces the entry for a path fingerprint.
    ///
    /// Returns `false` when the cache is full of pinned entries and nothing
    /// could be evicted; the caller just proceeds uncached.
    pub fn insert(&self, fingerprint: Digest, entry: DirEntry) -> bool {
        self.inner.lock().insert(fingerprint, entry)
    }

    /// Looks up a path fingerprint, promoting the entry on a hit.
    pub fn lookup(&self, fingerprint: &Digest) -> Option<DirEntry> {
        self.inner.lock().lookup(fingerprint)
    }

    /// Drops the entry for a path fingerprint, pinned or not. Returns `false`
    /// when the entry was already absent.
    pub fn forget(&self, fingerprint: &Digest) -> bool {
        self.inner.lock().forget(fingerprint)
    }

    /// [`MetaCache::insert`] keyed directly by path.
    pub fn insert_path(&self, path: &str, entry: DirEntry) -> bool {
        self.insert(Digest::from_path(path), entry)
    }

    /// [`MetaCache::lookup`] keyed directly by path.
    pub fn lookup_path(&self, path: &str) -> Option<DirEntry> {
        self.lookup(&Digest::from_path(path))
    }

    /// [`MetaCache::forget`] keyed directly by path.
    pub fn forget_path(&self, path: &str) -> bool {
        self.forget(&Digest::from_path(path))
    }

    /// Pins an entry so eviction skips it. Returns `false` when absent.
    pub fn pin(&self, fingerprint: &Digest) -> bool {
        self.inner.lock().pin(fingerprint).is_some()
    }

    /// Releases one pin. See [`LruCache::unpin`] for the failure modes.
    pub fn unpin(&self, fingerprint: &Digest) -> Result<u32, crate::errors::CacheError> {
        self.inner.lock().unpin(fingerprint)
    }

    /// Drops every unpinned entry, e.g. on repository revision change.
    pub fn purge(&self) {
        self.inner.lock().purge();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}
