#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;

use cascache::{Digest, DirEntry, ObjectStore, QuotaManager};

/// A digest derived from a short label, for keying caches in tests.
pub fn key(label: &str) -> Digest {
    Digest::from_path(label)
}

/// A regular-file entry whose checksum encodes `seed`, so two entries built
/// from different seeds compare unequal.
pub fn file_entry(seed: u64) -> DirEntry {
    DirEntry::file(
        0o644,
        1000,
        1000,
        seed,
        1_700_000_000,
        Digest::from_content(&seed.to_le_bytes()),
    )
}

/// A blob of `len` bytes filled with `fill`, plus its content digest.
pub fn blob(len: usize, fill: u8) -> (Digest, Vec<u8>) {
    let bytes = vec![fill; len];
    (Digest::from_content(&bytes), bytes)
}

/// An object store over a fresh quota manager rooted at `root`.
pub async fn store_at(root: &Path, high_water: u64, low_water: u64) -> ObjectStore {
    let quota = Arc::new(QuotaManager::new(high_water, low_water));
    ObjectStore::open_root(root, quota).await.unwrap()
}
