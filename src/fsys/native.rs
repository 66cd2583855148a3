//! Native filesystem adapter over `std::fs`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::errors::{Result, ScanError};
use crate::fsys::case::CaseProbeCache;
use crate::fsys::zipfs::ZipFs;
use crate::fsys::{EntryInfo, ReadSeek, ScanFs};
use crate::model;

/// The on-disk filesystem, with a shared case-sensitivity probe cache.
#[derive(Debug, Default)]
pub struct NativeFs {
    case: CaseProbeCache,
}

impl NativeFs {
    /// A fresh adapter with an empty probe cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScanFs for NativeFs {
    fn stat(&self, path: &Path) -> std::io::Result<EntryInfo> {
        let meta = fs::metadata(path)?;
        Ok(info_from_metadata(&meta, false))
    }

    fn lstat(&self, path: &Path) -> std::io::Result<EntryInfo> {
        let meta = fs::symlink_metadata(path)?;
        if meta.file_type().is_symlink() {
            // Report the target's size and mtime; the link-ness is kept so
            // callers still know not to recurse.
            return match fs::metadata(path) {
                Ok(target) => Ok(info_from_metadata(&target, true)),
                Err(_) => Ok(info_from_metadata(&meta, true)),
            };
        }
        Ok(info_from_metadata(&meta, false))
    }

    fn open(&self, path: &Path) -> std::io::Result<Box<dyn ReadSeek + Send>> {
        let file = fs::File::open(path)?;
        Ok(Box::new(file))
    }

    fn walk(
        &self,
        root: &Path,
    ) -> std::io::Result<Box<dyn Iterator<Item = std::io::Result<(PathBuf, EntryInfo)>> + Send + '_>>
    {
        let children = read_dir_sorted(root)?;
        Ok(Box::new(NativeWalk {
            stack: vec![children.into_iter()],
        }))
    }

    fn is_case_sensitive(&self, path: &Path) -> bool {
        self.case.is_case_sensitive(path)
    }

    fn open_zip(&self, path: &Path) -> Result<Arc<dyn ScanFs>> {
        let info = self.stat(path).map_err(|source| ScanError::io(path, source))?;
        let reader = self.open(path).map_err(|source| ScanError::io(path, source))?;
        Ok(Arc::new(ZipFs::mount(
            reader,
            path.to_path_buf(),
            info.mod_time,
        )?))
    }
}

/// Depth-first traversal state: a stack of sorted sibling iterators.
struct NativeWalk {
    stack: Vec<std::vec::IntoIter<(PathBuf, EntryInfo)>>,
}

impl Iterator for NativeWalk {
    type Item = std::io::Result<(PathBuf, EntryInfo)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some((path, info)) => {
                    if info.is_dir {
                        // Unreadable subtrees are skipped, matching the
                        // graceful handling of vanished/forbidden entries.
                        if let Ok(children) = read_dir_sorted(&path) {
                            self.stack.push(children.into_iter());
                        }
                    }
                    return Some(Ok((path, info)));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// One directory's entries, sorted by name for deterministic traversal.
///
/// Symlinked directories are dropped (cycle safety); symlinked files are
/// kept with target stat data; dangling symlinks are dropped.
fn read_dir_sorted(dir: &Path) -> std::io::Result<Vec<(PathBuf, EntryInfo)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.file_type().is_symlink() {
            match fs::metadata(&path) {
                Ok(target) if target.is_dir() => continue,
                Ok(target) => out.push((path, info_from_metadata(&target, true))),
                Err(_) => continue,
            }
        } else {
            out.push((path, info_from_metadata(&meta, false)));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn info_from_metadata(meta: &fs::Metadata, is_symlink: bool) -> EntryInfo {
    let mod_time = meta
        .modified()
        .map_or_else(|_| model::now_secs(), model::system_time_to_secs);
    EntryInfo {
        size: meta.len(),
        mod_time,
        is_dir: meta.is_dir(),
        is_symlink,
    }
}

/// Whether an IO error means the path is simply not there.
#[must_use]
pub fn is_not_found(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::NotFound
}
