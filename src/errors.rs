//! Error taxonomy shared by the cache layers.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by cache, store, and quota operations.
///
/// Everything except [`CacheError::InvalidState`] is an expected runtime
/// condition the caller degrades from (fall back to remote resolution, skip
/// local caching, retry after unpin). `InvalidState` signals a pin lifecycle
/// bug upstream and is additionally logged at error severity where raised.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key or digest is not present. Recoverable; the caller resolves the
    /// value from the catalog or remote and re-inserts.
    #[error("not found")]
    NotFound,

    /// The object cannot fit even after evicting every unpinned entry. The
    /// object must not be written locally; serve it straight from remote.
    #[error("capacity unavailable: {size} bytes requested, {available} evictable")]
    CapacityUnavailable { size: u64, available: u64 },

    /// Removal attempted on a pinned object.
    #[error("object is pinned")]
    InUse,

    /// Unpin without a matching pin. A lifecycle defect in the caller, never
    /// silently clamped.
    #[error("unpin without matching pin")]
    InvalidState,

    /// A concurrent commit for the same digest is already staging.
    #[error("concurrent commit in flight for the same digest")]
    WriteConflict,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures validating the object store's root directory at startup.
#[derive(Debug, Error)]
pub enum InvalidRootError {
    #[error("root path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("root path contains data not written by this cache: {0}")]
    ForeignData(PathBuf),

    #[error("io error while preparing root path: {0}")]
    Io(#[from] std::io::Error),
}
