//! Filesystem adapter: native traversal, per-path case probing, and
//! zip-over-FS overlays.
//!
//! The scanner never touches `std::fs` directly; everything flows through
//! [`ScanFs`] so that archive interiors and test doubles look identical to
//! an on-disk tree.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::errors::Result;

pub mod case;
pub mod native;
pub mod zipfs;

pub use native::NativeFs;
pub use zipfs::ZipFs;

/// Readable, seekable stream handed to fingerprint calculators.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Stat data for a single filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// Size in bytes; for symlinks, the target's size.
    pub size: u64,
    /// Modification time, second precision.
    pub mod_time: DateTime<Utc>,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Whether the entry was reached through a symlink.
    pub is_symlink: bool,
}

/// Capability surface over a filesystem (native or archive overlay).
///
/// Paths are always absolute. For archive overlays, paths are the mount
/// path (the archive file's own path) joined with the entry's internal
/// path, so catalog rows from both worlds share one namespace.
pub trait ScanFs: Send + Sync {
    /// Stat following symlinks.
    fn stat(&self, path: &Path) -> std::io::Result<EntryInfo>;

    /// Stat without following symlinks.
    ///
    /// A failing lstat is how rename detection observes absence; callers
    /// treat the error as evidence, not as a fault.
    fn lstat(&self, path: &Path) -> std::io::Result<EntryInfo>;

    /// Open a file for reading. The stream must be seekable (oshash reads
    /// head and tail).
    fn open(&self, path: &Path) -> std::io::Result<Box<dyn ReadSeek + Send>>;

    /// Depth-first traversal of everything under `root`, excluding `root`
    /// itself. Directories are yielded before their contents.
    fn walk(
        &self,
        root: &Path,
    ) -> std::io::Result<Box<dyn Iterator<Item = std::io::Result<(PathBuf, EntryInfo)>> + Send + '_>>;

    /// Whether the filesystem is case-sensitive at `path`.
    ///
    /// Per-path because mount points may differ; probing is lazy and
    /// cached. Archive overlays are always case-sensitive.
    fn is_case_sensitive(&self, path: &Path) -> bool;

    /// Mount the archive at `path` as a nested filesystem.
    fn open_zip(&self, path: &Path) -> Result<Arc<dyn ScanFs>>;
}
