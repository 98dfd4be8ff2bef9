//! Resolved directory-entry metadata.

use crate::digest::Digest;

/// Filesystem object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Metadata for a single resolved path.
///
/// Immutable once stored in the metadata cache: a fresh resolution replaces
/// the whole record, fields are never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub kind: EntryKind,
    /// Permission bits, `st_mode` style.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Size in bytes (target length for symlinks).
    pub size: u64,
    /// Modification time, unix seconds.
    pub mtime: i64,
    /// Content digest of the backing object. `None` for directories and
    /// symlinks, whose content is carried by the catalog itself.
    pub checksum: Option<Digest>,
}

impl DirEntry {
    /// Shorthand for a regular-file entry backed by `checksum`.
    #[must_use]
    pub fn file(mode: u32, uid: u32, gid: u32, size: u64, mtime: i64, checksum: Digest) -> Self {
        Self {
            kind: EntryKind::File,
            mode,
            uid,
            gid,
            size,
            mtime,
            checksum: Some(checksum),
        }
    }

    /// Shorthand for a directory entry.
    #[must_use]
    pub fn directory(mode: u32, uid: u32, gid: u32, mtime: i64) -> Self {
        Self {
            kind: EntryKind::Directory,
            mode,
            uid,
            gid,
            size: 0,
            mtime,
            checksum: None,
        }
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}
