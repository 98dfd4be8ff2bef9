//! Local caching layer of a read-only, content-addressed network filesystem
//! client.
//!
//! Two coupled caches under one roof: an in-memory, capacity-bounded lookup
//! cache mapping path fingerprints to resolved metadata
//! ([`cache::meta::MetaCache`]), and a quota-governed on-disk store of
//! content-addressed objects ([`store::ObjectStore`]) whose least-recently
//! used unpinned objects are evicted by the [`quota::QuotaManager`] whenever
//! cumulative size crosses the configured high-water mark.

/// Caching primitives: the generic LRU engine and its path-metadata
/// specialization.
pub mod cache;
/// Application configuration settings.
pub mod config;
/// Administrative control channel over a unix socket.
pub mod ctrl;
/// Content and path fingerprints.
pub mod digest;
/// Resolved directory-entry metadata.
pub mod dirent;
/// Error taxonomy.
pub mod errors;
/// Quota accounting and eviction policy.
pub mod quota;
/// On-disk content-addressed object store.
pub mod store;

pub use cache::lru::{CacheStats, LruCache};
pub use cache::meta::MetaCache;
pub use digest::Digest;
pub use dirent::{DirEntry, EntryKind};
pub use errors::{CacheError, InvalidRootError};
pub use quota::{PinGuard, QuotaManager, QuotaState, QuotaStats};
pub use store::ObjectStore;
