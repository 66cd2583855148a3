//! Lazy, cached case-sensitivity probing.
//!
//! Sensitivity is a property of the directory holding a path, not of the
//! whole filesystem: a scan may cross mount points with different
//! semantics. The probe flips the case of an existing sibling name and
//! compares filesystem identity of the original and flipped paths.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

/// Probe results keyed by containing directory.
#[derive(Debug, Default)]
pub struct CaseProbeCache {
    probed: RwLock<HashMap<PathBuf, bool>>,
}

impl CaseProbeCache {
    /// A fresh, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the filesystem is case-sensitive at `path`.
    ///
    /// Unprobeable directories (empty, unreadable, or containing no
    /// letter-bearing names) default to case-sensitive, which only
    /// suppresses the optional case-insensitive second lookup.
    pub fn is_case_sensitive(&self, path: &Path) -> bool {
        let dir = path.parent().unwrap_or(path).to_path_buf();
        if let Some(&cached) = self.probed.read().get(&dir) {
            return cached;
        }
        let sensitive = probe_dir(&dir).unwrap_or(true);
        self.probed.write().insert(dir, sensitive);
        sensitive
    }
}

/// Probe one directory. `None` when no entry allows a conclusive probe.
fn probe_dir(dir: &Path) -> Option<bool> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(flipped) = flip_case(&name) else {
            continue;
        };
        let original = dir.join(&name);
        let alternate = dir.join(&flipped);
        let Ok(original_meta) = fs::symlink_metadata(&original) else {
            continue;
        };
        return match fs::symlink_metadata(&alternate) {
            Err(_) => Some(true),
            Ok(alternate_meta) => Some(!same_identity(&original_meta, &alternate_meta)),
        };
    }
    None
}

/// A case-flipped variant of `name`, or `None` when no ASCII letter exists
/// to flip.
fn flip_case(name: &str) -> Option<String> {
    if !name.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let flipped = if name.chars().any(|c| c.is_ascii_lowercase()) {
        name.to_ascii_uppercase()
    } else {
        name.to_ascii_lowercase()
    };
    (flipped != name).then_some(flipped)
}

#[cfg(unix)]
fn same_identity(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_identity(_a: &fs::Metadata, _b: &fs::Metadata) -> bool {
    // Without inode identity, an existing flipped-case path is taken to be
    // the same file (two names differing only in case cannot coexist on a
    // case-insensitive filesystem).
    true
}
