//! Folder reconciliation: new, case-change/update, or move.
//!
//! Runs on the walker thread so a folder's id is committed before any
//! contained file is reconciled. A detected move repairs the stored paths
//! of the whole descendant hierarchy inside the same transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::catalog::ScanTxn;
use crate::core::errors::Result;
use crate::core::paths;
use crate::fsys::{EntryInfo, ScanFs};
use crate::model::{self, FileId, Folder, FolderId};
use crate::scanner::{FolderCache, ScanCtx};

/// Terminal result of one folder reconciliation.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct FolderOutcome {
    pub folder: Folder,
    pub created: bool,
    pub updated: bool,
    pub moved: bool,
}

impl FolderOutcome {
    fn unchanged(folder: Folder) -> Self {
        Self {
            folder,
            created: false,
            updated: false,
            moved: false,
        }
    }
}

/// Reconcile one on-disk directory against the catalog.
///
/// `zip_file_id` is the archive scope the folder row belongs to;
/// `parent_scope` is the scope its parent folder lives in (these differ
/// only for an archive's mount folder, whose parent is outside the
/// archive).
pub(crate) fn reconcile_folder(
    cx: &mut ScanCtx,
    fs: &dyn ScanFs,
    path: &Path,
    info: &EntryInfo,
    zip_file_id: Option<FileId>,
    parent_scope: Option<FileId>,
) -> Result<FolderOutcome> {
    let cache = Arc::clone(&cx.cache);
    let path_buf = path.to_path_buf();
    let mod_time = model::truncate_to_secs(info.mod_time);

    cx.conn.with_txn(|txn| {
        let found = match txn.folders().find_by_path(&path_buf, true)? {
            Some(folder) => Some(folder),
            None if zip_file_id.is_none() && !fs.is_case_sensitive(&path_buf) => {
                txn.folders().find_by_path(&path_buf, false)?
            }
            None => None,
        };

        if let Some(mut existing) = found {
            let case_changed = existing.path != path_buf;
            let zip_changed = existing.zip_file_id != zip_file_id;
            let time_changed = existing.mod_time != mod_time;
            if !(case_changed || zip_changed || time_changed) {
                return Ok(FolderOutcome::unchanged(existing));
            }
            existing.path = path_buf.clone();
            existing.zip_file_id = zip_file_id;
            existing.mod_time = mod_time;
            existing.updated_at = model::now_secs();
            txn.folders().update(&existing)?;
            return Ok(FolderOutcome {
                folder: existing,
                created: false,
                updated: true,
                moved: false,
            });
        }

        // Rename detection: a same-named folder whose old location is gone.
        let name = paths::basename(&path_buf);
        if !name.is_empty() {
            for candidate in txn.folders().find_by_basename(&name, zip_file_id)? {
                if fs.lstat(&candidate.path).is_ok() {
                    continue;
                }
                let old_path = candidate.path.clone();
                let mut moved = candidate;
                moved.path = path_buf.clone();
                moved.parent_folder_id =
                    resolve_parent(txn, &cache, fs, &path_buf, parent_scope)?;
                moved.zip_file_id = zip_file_id;
                moved.mod_time = mod_time;
                moved.updated_at = model::now_secs();
                txn.folders().update(&moved)?;
                repair_children(txn, &moved)?;
                let old = old_path.display().to_string();
                let new = path_buf.display().to_string();
                txn.on_commit(move || info!("{old} moved to {new}. Updating path..."));
                return Ok(FolderOutcome {
                    folder: moved,
                    created: false,
                    updated: false,
                    moved: true,
                });
            }
        }

        let parent = resolve_parent(txn, &cache, fs, &path_buf, parent_scope)?;
        let mut folder = Folder::new(path_buf.clone(), parent, zip_file_id, mod_time);
        txn.folders().create(&mut folder)?;
        let path_display = path_buf.display().to_string();
        txn.on_commit(move || info!("{path_display} doesn't exist. Creating new folder entry..."));
        Ok(FolderOutcome {
            folder,
            created: true,
            updated: false,
            moved: false,
        })
    })
}

/// Resolve the parent folder id for `path`, or `None` when the folder is a
/// top-level root (legitimate during parallel scans).
fn resolve_parent(
    txn: &ScanTxn<'_>,
    cache: &FolderCache,
    fs: &dyn ScanFs,
    path: &Path,
    parent_scope: Option<FileId>,
) -> Result<Option<FolderId>> {
    let Some(dir) = paths::dirname(path) else {
        return Ok(None);
    };
    if let Some(id) = cache.get(dir, parent_scope) {
        return Ok(Some(id));
    }
    let found = match txn.folders().find_by_path(dir, true)? {
        Some(folder) => Some(folder),
        None if parent_scope.is_none() && !fs.is_case_sensitive(dir) => {
            txn.folders().find_by_path(dir, false)?
        }
        None => None,
    };
    Ok(found.map(|f| f.id))
}

/// Rewrite descendant paths after a move, depth-first, same transaction.
fn repair_children(txn: &ScanTxn<'_>, parent: &Folder) -> Result<()> {
    for mut child in txn.folders().find_children(parent.id)? {
        let name = PathBuf::from(paths::basename(&child.path));
        child.path = parent.path.join(name);
        child.updated_at = model::now_secs();
        txn.folders().update(&child)?;
        repair_children(txn, &child)?;
    }
    Ok(())
}
