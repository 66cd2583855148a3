//! Zip archive mounted as a filesystem overlay.
//!
//! Entry paths are the archive file's own path joined with the entry's
//! internal path, so an archive interior shares the catalog namespace of
//! the tree it sits in. Nested archives compose by mounting against the
//! enclosing overlay.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use zip::ZipArchive;

use crate::core::errors::{Result, ScanError};
use crate::fsys::{EntryInfo, ReadSeek, ScanFs};

/// One archive entry: its index in the archive (synthesized directories
/// have none) and its stat data.
#[derive(Debug, Clone)]
struct ZipEntry {
    index: Option<usize>,
    info: EntryInfo,
}

/// A zip archive mounted at the outer file's path.
pub struct ZipFs {
    mount: PathBuf,
    archive: Mutex<ZipArchive<Box<dyn ReadSeek + Send>>>,
    entries: BTreeMap<PathBuf, ZipEntry>,
    mount_info: EntryInfo,
}

impl ZipFs {
    /// Mount an archive read from `reader` at `mount`.
    ///
    /// `fallback_mod_time` (the archive file's own mtime) stands in for
    /// entries and synthesized directories without a usable timestamp.
    pub fn mount(
        reader: Box<dyn ReadSeek + Send>,
        mount: PathBuf,
        fallback_mod_time: DateTime<Utc>,
    ) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).map_err(|e| ScanError::Archive {
            path: mount.clone(),
            details: e.to_string(),
        })?;

        let mut entries: BTreeMap<PathBuf, ZipEntry> = BTreeMap::new();
        for index in 0..archive.len() {
            let entry = archive.by_index(index).map_err(|e| ScanError::Archive {
                path: mount.clone(),
                details: e.to_string(),
            })?;
            // Entries escaping the mount (absolute or ..-laden names) are
            // dropped rather than mounted outside the archive.
            let Some(rel) = entry.enclosed_name() else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                continue;
            }
            let mod_time = entry
                .last_modified()
                .and_then(zip_datetime_to_utc)
                .unwrap_or(fallback_mod_time);
            let info = EntryInfo {
                size: entry.size(),
                mod_time,
                is_dir: entry.is_dir(),
                is_symlink: false,
            };
            entries.insert(
                rel.clone(),
                ZipEntry {
                    index: Some(index),
                    info,
                },
            );
            synthesize_ancestors(&mut entries, &rel, fallback_mod_time);
        }

        let mount_info = EntryInfo {
            size: 0,
            mod_time: fallback_mod_time,
            is_dir: true,
            is_symlink: false,
        };

        Ok(Self {
            mount,
            archive: Mutex::new(archive),
            entries,
            mount_info,
        })
    }

    /// The archive file's path, which prefixes every entry path.
    #[must_use]
    pub fn mount_path(&self) -> &Path {
        &self.mount
    }

    /// Internal path of `path` relative to the mount; `None` when outside.
    fn rel(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.mount).ok().map(Path::to_path_buf)
    }

    fn entry_info(&self, path: &Path) -> std::io::Result<EntryInfo> {
        let rel = self
            .rel(path)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "outside archive"))?;
        if rel.as_os_str().is_empty() {
            return Ok(self.mount_info);
        }
        self.entries
            .get(&rel)
            .map(|e| e.info)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such entry"))
    }
}

impl ScanFs for ZipFs {
    fn stat(&self, path: &Path) -> std::io::Result<EntryInfo> {
        self.entry_info(path)
    }

    fn lstat(&self, path: &Path) -> std::io::Result<EntryInfo> {
        // Archives carry no symlinks worth honoring.
        self.entry_info(path)
    }

    fn open(&self, path: &Path) -> std::io::Result<Box<dyn ReadSeek + Send>> {
        let rel = self
            .rel(path)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "outside archive"))?;
        let entry = self
            .entries
            .get(&rel)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such entry"))?;
        let Some(index) = entry.index else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot open a directory entry",
            ));
        };
        if entry.info.is_dir {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot open a directory entry",
            ));
        }

        // Inflate fully: calculators need a seekable stream, and zip entry
        // readers are forward-only.
        let mut archive = self.archive.lock();
        let mut entry_reader = archive.by_index(index).map_err(std::io::Error::other)?;
        let mut buf = Vec::with_capacity(usize::try_from(entry.info.size).unwrap_or(0));
        entry_reader.read_to_end(&mut buf)?;
        Ok(Box::new(Cursor::new(buf)))
    }

    fn walk(
        &self,
        root: &Path,
    ) -> std::io::Result<Box<dyn Iterator<Item = std::io::Result<(PathBuf, EntryInfo)>> + Send + '_>>
    {
        let rel_root = self
            .rel(root)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "outside archive"))?;
        if !rel_root.as_os_str().is_empty() && !self.entries.contains_key(&rel_root) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such entry",
            ));
        }
        let mount = self.mount.clone();
        // BTreeMap order is lexicographic by components, so a directory
        // always precedes its contents.
        let iter = self
            .entries
            .iter()
            .filter(move |(rel, _)| {
                rel_root.as_os_str().is_empty()
                    || (rel.starts_with(&rel_root) && rel.as_path() != rel_root.as_path())
            })
            .map(move |(rel, entry)| Ok((mount.join(rel), entry.info)));
        Ok(Box::new(iter))
    }

    fn is_case_sensitive(&self, _path: &Path) -> bool {
        true
    }

    fn open_zip(&self, path: &Path) -> Result<Arc<dyn ScanFs>> {
        let info = self.stat(path).map_err(|source| ScanError::io(path, source))?;
        let reader = self.open(path).map_err(|source| ScanError::io(path, source))?;
        Ok(Arc::new(Self::mount(
            reader,
            path.to_path_buf(),
            info.mod_time,
        )?))
    }
}

/// Insert synthesized directory entries for every ancestor of `rel` that
/// the archive does not store explicitly.
fn synthesize_ancestors(
    entries: &mut BTreeMap<PathBuf, ZipEntry>,
    rel: &Path,
    mod_time: DateTime<Utc>,
) {
    for ancestor in rel.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        entries.entry(ancestor.to_path_buf()).or_insert(ZipEntry {
            index: None,
            info: EntryInfo {
                size: 0,
                mod_time,
                is_dir: true,
                is_symlink: false,
            },
        });
    }
}

/// Best-effort conversion of a zip timestamp (no timezone) to UTC.
fn zip_datetime_to_utc(dt: zip::DateTime) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )
    .single()
}
