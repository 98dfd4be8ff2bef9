//! On-disk store of content-addressed objects.
//!
//! Each object lives at `<root>/<first-2-hex>/<remaining-hex>` of its
//! content digest. Writes are staged under `<root>/txn/` and renamed into
//! place, so a concurrent reader never observes a partially written object.
//! All bookkeeping goes through the [`QuotaManager`]; all disk IO happens
//! outside its ledger lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::digest::Digest;
use crate::errors::{CacheError, InvalidRootError};
use crate::quota::{PinGuard, QuotaManager, QuotaStats};

/// Marker placed in the root directory so later runs can tell this cache's
/// data apart from a foreign directory. Changing it orphans existing caches.
const MARKER_FILE: &str = ".cascache";

/// Staging directory for in-flight commits, cleared on startup.
const TXN_DIR: &str = "txn";

/// Content-addressed object store with quota-governed eviction.
pub struct ObjectStore {
    root: PathBuf,
    quota: Arc<QuotaManager>,
    /// Digests with a commit currently staging. A second commit for the same
    /// digest fails with `WriteConflict` instead of racing on the rename.
    staging: scc::HashSet<Digest>,
    txn_counter: AtomicU64,
}

/// Removes the staging reservation when a commit finishes, on every path.
struct StageGuard<'a> {
    staging: &'a scc::HashSet<Digest>,
    digest: Digest,
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        let _ = self.staging.remove(&self.digest);
    }
}

impl ObjectStore {
    /// Opens (or creates) an object store rooted at `root`.
    ///
    /// An existing directory must either be empty or carry the marker file
    /// from a previous run. Objects found on disk are re-registered with the
    /// quota manager in ascending modification-time order, so the recency
    /// order survives process restarts; leftover staging files are deleted.
    pub async fn open_root(
        root: &Path,
        quota: Arc<QuotaManager>,
    ) -> Result<Self, InvalidRootError> {
        let mut pbuf = match tokio::fs::canonicalize(root).await {
            Ok(mut p) => {
                if !tokio::fs::metadata(&p).await?.is_dir() {
                    return Err(InvalidRootError::NotADirectory(p));
                }

                let mut entries = tokio::fs::read_dir(&p).await?;
                let is_empty = entries.next_entry().await?.is_none();

                p.push(MARKER_FILE);
                let marker_exists = tokio::fs::try_exists(&p).await?;
                p.pop();

                if !(is_empty || marker_exists) {
                    return Err(InvalidRootError::ForeignData(p));
                }

                Ok(p)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(root).await?;
                tokio::fs::canonicalize(root).await
            }
            Err(e) => return Err(e.into()),
        }?;

        pbuf.push(MARKER_FILE);
        tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&pbuf)
            .await?;
        pbuf.pop();

        let txn = pbuf.join(TXN_DIR);
        tokio::fs::create_dir_all(&txn).await?;
        clear_dir(&txn).await?;

        let store = Self {
            root: pbuf,
            quota,
            staging: scc::HashSet::new(),
            txn_counter: AtomicU64::new(0),
        };
        store.rebuild_ledger().await?;
        Ok(store)
    }

    /// On-disk path of an object: two-hex-digit fan-out directory plus the
    /// remaining digest digits.
    fn object_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Re-registers every object already on disk, oldest first.
    async fn rebuild_ledger(&self) -> Result<(), std::io::Error> {
        let mut found: Vec<(std::time::SystemTime, Digest, u64)> = Vec::new();

        let mut top = tokio::fs::read_dir(&self.root).await?;
        while let Some(dir) = top.next_entry().await? {
            let dir_name = dir.file_name();
            let Some(prefix) = dir_name.to_str() else {
                continue;
            };
            if prefix.len() != 2 || !dir.file_type().await?.is_dir() {
                continue;
            }
            let mut objects = tokio::fs::read_dir(dir.path()).await?;
            while let Some(object) = objects.next_entry().await? {
                let file_name = object.file_name();
                let Some(suffix) = file_name.to_str() else {
                    continue;
                };
                let Ok(digest) = format!("{prefix}{suffix}").parse::<Digest>() else {
                    warn!(path = %object.path().display(), "foreign file in cache, removing");
                    tokio::fs::remove_file(object.path()).await?;
                    continue;
                };
                let meta = object.metadata().await?;
                let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                found.push((mtime, digest, meta.len()));
            }
        }

        found.sort_by_key(|(mtime, _, _)| *mtime);
        let count = found.len();
        for (_, digest, size) in found {
            match self.quota.insert(digest, size) {
                Ok(victims) => {
                    self.unlink_victims(&victims).await;
                }
                Err(err) => {
                    warn!(%digest, size, %err, "cached object no longer fits quota, removing");
                    let _ = tokio::fs::remove_file(self.object_path(&digest)).await;
                }
            }
        }
        info!(
            objects = count,
            total_bytes = self.quota.stats().total_bytes,
            "rebuilt object ledger"
        );
        Ok(())
    }

    /// Whether an object is registered. No recency side effect.
    #[must_use]
    pub fn contains(&self, digest: &Digest) -> bool {
        self.quota.contains(digest)
    }

    /// Opens a cached object for reading, promoting its recency.
    ///
    /// A [`CacheError::NotFound`] means "not yet cached" (an in-flight
    /// commit may not have renamed into place yet) and the caller falls
    /// back to a remote fetch.
    pub async fn open(&self, digest: &Digest) -> Result<tokio::fs::File, CacheError> {
        match tokio::fs::File::open(self.object_path(digest)).await {
            Ok(file) => {
                self.quota.touch(digest);
                Ok(file)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CacheError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically publishes a fetched object under its content digest.
    ///
    /// The object is registered with the quota manager before any byte hits
    /// disk, so an object that cannot fit is never written locally. Commits
    /// of an already-cached digest degrade to a recency touch; a second
    /// in-flight commit of the same digest fails with
    /// [`CacheError::WriteConflict`]. On an IO failure the registration is
    /// rolled back and nothing is published.
    pub async fn commit(&self, digest: &Digest, bytes: &[u8]) -> Result<(), CacheError> {
        if self.quota.contains(digest) {
            self.quota.touch(digest);
            return Ok(());
        }
        if self.staging.insert(*digest).is_err() {
            return Err(CacheError::WriteConflict);
        }
        let _guard = StageGuard {
            staging: &self.staging,
            digest: *digest,
        };

        let victims = self.quota.insert(*digest, bytes.len() as u64)?;
        self.unlink_victims(&victims).await;

        let seq = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        let stage = self.root.join(TXN_DIR).join(format!("commit.{seq}"));
        if let Err(err) = self.publish(&stage, digest, bytes).await {
            let _ = self.quota.remove(digest);
            let _ = tokio::fs::remove_file(&stage).await;
            return Err(err.into());
        }

        // A concurrent sweep may have picked this entry as a victim while
        // the bytes were still staging; that sweep found no file to unlink,
        // so the eviction must be finished here. The staging reservation is
        // still held, which rules out a racing republish of the digest.
        if !self.quota.contains(digest) {
            let _ = tokio::fs::remove_file(self.object_path(digest)).await;
            debug!(%digest, "object evicted while staging");
            return Ok(());
        }
        debug!(%digest, size = bytes.len(), "committed object");
        Ok(())
    }

    /// Stage-then-rename; atomic with respect to concurrent readers.
    async fn publish(
        &self,
        stage: &Path,
        digest: &Digest,
        bytes: &[u8],
    ) -> Result<(), std::io::Error> {
        let mut file = tokio::fs::File::create(stage).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        let target = self.object_path(digest);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(stage, &target).await
    }

    /// Deletes a cached object and its ledger entry.
    ///
    /// Fails with [`CacheError::InUse`] while the object is pinned and
    /// [`CacheError::NotFound`] when it is not registered.
    pub async fn remove(&self, digest: &Digest) -> Result<(), CacheError> {
        self.quota.remove(digest)?;
        match tokio::fs::remove_file(self.object_path(digest)).await {
            Ok(()) => Ok(()),
            // Ledger and disk can disagree transiently during a commit
            // rollback; a missing file is already the desired end state.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Manual sweep down to `target_bytes`, used by administrative cleanup.
    /// Returns the number of bytes freed on disk.
    pub async fn cleanup(&self, target_bytes: u64) -> u64 {
        let victims = self.quota.evict(target_bytes);
        let freed = self.unlink_victims(&victims).await;
        info!(target_bytes, freed, victims = victims.len(), "cache cleanup");
        freed
    }

    /// Unlinks sweep victims outside the ledger lock, returning bytes freed.
    /// Failures are logged and skipped; the ledger already dropped the entry.
    async fn unlink_victims(&self, victims: &[Digest]) -> u64 {
        let mut freed = 0u64;
        for digest in victims {
            let path = self.object_path(digest);
            match tokio::fs::metadata(&path).await {
                Ok(meta) => freed += meta.len(),
                Err(_) => continue,
            }
            if let Err(err) = tokio::fs::remove_file(&path).await {
                warn!(%digest, %err, "failed to unlink evicted object");
            }
        }
        freed
    }

    /// Pins an object against eviction. Returns `false` when absent.
    pub fn pin(&self, digest: &Digest) -> bool {
        self.quota.pin(digest)
    }

    /// Releases one pin. See [`QuotaManager::unpin`].
    pub fn unpin(&self, digest: &Digest) -> Result<(), CacheError> {
        self.quota.unpin(digest)
    }

    /// Pins an object for the lifetime of the returned guard.
    pub fn pin_scoped(&self, digest: Digest) -> Option<PinGuard> {
        self.quota.pin_scoped(digest)
    }

    #[must_use]
    pub fn stats(&self) -> QuotaStats {
        self.quota.stats()
    }

    /// The quota manager governing this store.
    #[must_use]
    pub fn quota(&self) -> &Arc<QuotaManager> {
        &self.quota
    }

    /// The validated root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Deletes everything inside `path`, leaving the directory itself in place.
/// Used to drop leftover staging files from an interrupted run.
async fn clear_dir(path: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
