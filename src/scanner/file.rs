//! File reconciliation: new, unchanged, updated, or renamed.
//!
//! Fingerprints and decorators run outside the persistence transaction
//! (they are pure filesystem reads); the transaction body re-runs the
//! catalog decision from the path lookup, so a busy retry or a lost
//! create race re-decides against refreshed state without rehashing.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::catalog::ScanTxn;
use crate::core::errors::{Result, ScanError};
use crate::core::paths;
use crate::fsys::ScanFs;
use crate::model::{self, CatFile, FileId, FingerprintKind, FolderId};
use crate::scanner::filters::{self, PathFilter};
use crate::scanner::walker::ScannedFile;
use crate::scanner::{FolderCache, ScanCtx, ScanPipeline};

/// Terminal result of one file reconciliation. At most one flag is set;
/// all false means the file was untouched.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct FileOutcome {
    pub file: CatFile,
    pub new: bool,
    pub renamed: bool,
    pub updated: bool,
}

impl FileOutcome {
    fn unchanged(file: CatFile) -> Self {
        Self {
            file,
            new: false,
            renamed: false,
            updated: false,
        }
    }

    fn updated(file: CatFile) -> Self {
        Self {
            file,
            new: false,
            renamed: false,
            updated: true,
        }
    }
}

/// Reconcile one scanned file against the catalog.
pub(crate) fn reconcile_file(cx: &mut ScanCtx, scanned: &ScannedFile) -> Result<FileOutcome> {
    let fs = scanned.fs.as_ref();
    let path = scanned.path.as_path();

    let existing = cx.conn.with_db(|db| {
        match db.files().find_by_path(path, true)? {
            Some(file) => Ok(Some(file)),
            None if !fs.is_case_sensitive(path) => db.files().find_by_path(path, false),
            None => Ok(None),
        }
    })?;

    match existing {
        Some(existing) => reconcile_existing(cx, scanned, existing),
        None => reconcile_new_path(cx, scanned),
    }
}

// ──────────────────── existing row ────────────────────

fn reconcile_existing(
    cx: &mut ScanCtx,
    scanned: &ScannedFile,
    existing: CatFile,
) -> Result<FileOutcome> {
    let mod_time = model::truncate_to_secs(scanned.info.mod_time);
    let new_basename = paths::basename(&scanned.path);
    let time_changed = existing.mod_time != mod_time;
    // A stored path differing from the observed one means a case change
    // (the row was found through the case-insensitive lookup) and must be
    // rewritten, whether the casing moved in the basename or a directory.
    let name_changed =
        existing.basename != new_basename || existing.path != scanned.path;

    if time_changed || name_changed {
        info!("{} has been updated: rescanning", scanned.path.display());
        return update_existing(cx, scanned, existing);
    }
    if cx.options.rescan {
        info!("rescanning {}", scanned.path.display());
        return update_existing(cx, scanned, existing);
    }
    repair_unchanged(cx, scanned, existing)
}

fn update_existing(
    cx: &mut ScanCtx,
    scanned: &ScannedFile,
    existing: CatFile,
) -> Result<FileOutcome> {
    let pipeline = Arc::clone(&cx.pipeline);
    let fs = scanned.fs.as_ref();

    let mut snapshot = existing.clone();
    snapshot.path = scanned.path.clone();
    snapshot.basename = paths::basename(&scanned.path);
    snapshot.size = scanned.info.size;
    snapshot.mod_time = model::truncate_to_secs(scanned.info.mod_time);
    snapshot.zip_file_id = scanned.zip_file_id;

    info!("Calculating fingerprints for {} ...", scanned.path.display());
    let fresh = pipeline.calculator.calculate(fs, &snapshot, false)?;

    // The stored set is superseded wholesale by the freshly computed
    // one; a kind the calculator no longer produces is stale for the
    // new content. A stored MD5 invalidated by a changed oshash gets
    // its removal logged.
    let oshash_changed = matches!(
        (
            fresh.get(FingerprintKind::Oshash),
            existing.fingerprints.get(FingerprintKind::Oshash),
        ),
        (Some(new), Some(old)) if new != old
    );
    let dropped_md5 = oshash_changed
        && !fresh.contains(FingerprintKind::Md5)
        && existing.fingerprints.contains(FingerprintKind::Md5);
    snapshot.fingerprints = fresh;

    let decorated = pipeline.run_decorators(fs, snapshot)?;
    let old_snapshot = existing;

    cx.conn.with_txn(|txn| {
        let mut file = decorated.clone();
        file.updated_at = model::now_secs();
        txn.files().update(&file)?;
        pipeline.run_handlers(txn, &file, Some(&old_snapshot))?;
        if dropped_md5 {
            let path_display = file.path.display().to_string();
            txn.on_commit(move || info!("Removing outdated checksum from {path_display}"));
        }
        Ok(FileOutcome::updated(file))
    })
}

fn repair_unchanged(
    cx: &mut ScanCtx,
    scanned: &ScannedFile,
    existing: CatFile,
) -> Result<FileOutcome> {
    let pipeline = Arc::clone(&cx.pipeline);
    let fs = scanned.fs.as_ref();

    let mut file = existing.clone();
    let mut repaired = false;
    if pipeline.any_missing_metadata(fs, &file) {
        file = pipeline.run_decorators(fs, file)?;
        repaired = true;
    }

    // Fill in fingerprint kinds that were enabled after this file was
    // first catalogued.
    let filled = pipeline.calculator.calculate(fs, &file, true)?;
    let fingerprints_changed = filled != file.fingerprints;
    if fingerprints_changed {
        file.fingerprints = filled;
    }

    let handlers_required = pipeline.handlers_required(&file);
    if !(repaired || fingerprints_changed || handlers_required) {
        return Ok(FileOutcome::unchanged(existing));
    }

    cx.conn.with_txn(|txn| {
        let mut row = file.clone();
        if repaired || fingerprints_changed {
            row.updated_at = model::now_secs();
            txn.files().update(&row)?;
        }
        if handlers_required {
            pipeline.run_handlers(txn, &row, None)?;
        }
        if repaired {
            let path_display = row.path.display().to_string();
            txn.on_commit(move || info!("Updating metadata for {path_display}"));
        }
        Ok(FileOutcome::updated(row))
    })
}

// ──────────────────── new path ────────────────────

fn reconcile_new_path(cx: &mut ScanCtx, scanned: &ScannedFile) -> Result<FileOutcome> {
    let pipeline = Arc::clone(&cx.pipeline);
    let cache = Arc::clone(&cx.cache);
    let fs = scanned.fs.as_ref();

    info!("Calculating fingerprints for {} ...", scanned.path.display());
    let mut base = CatFile::snapshot(
        scanned.path.clone(),
        scanned.zip_file_id,
        scanned.info.size,
        scanned.info.mod_time,
    );
    base.fingerprints = pipeline.calculator.calculate(fs, &base, false)?;
    let base = pipeline.run_decorators(fs, base)?;

    cx.conn.with_txn(|txn| {
        // Refreshed decision: a racing worker (or an aborted attempt of
        // this one) may have claimed the path already.
        if let Some(existing) = txn.files().find_by_path(&base.path, true)? {
            return Ok(FileOutcome::unchanged(existing));
        }

        let mut seen: BTreeSet<i64> = BTreeSet::new();
        for fp in base.fingerprints.iter() {
            for candidate in txn.files().find_by_fingerprint(&fp)? {
                if !candidate.same_zip_scope(scanned.zip_file_id) {
                    continue;
                }
                if !seen.insert(candidate.id.0) {
                    continue;
                }
                if !candidate_missing(fs, &candidate, &base.path, &pipeline.scan_filters) {
                    continue;
                }
                return rename_file(txn, &pipeline, &cache, fs, candidate, &base, scanned);
            }
        }

        let parent = require_parent(txn, &cache, fs, &base.path, scanned.zip_file_id)?;
        let mut file = base.clone();
        file.parent_folder_id = parent;
        let now = model::now_secs();
        file.created_at = now;
        file.updated_at = now;
        txn.files().create(&mut file)?;
        pipeline.run_handlers(txn, &file, None)?;
        Ok(FileOutcome {
            file,
            new: true,
            renamed: false,
            updated: false,
        })
    })
}

/// Whether a fingerprint-matched candidate no longer exists where the
/// catalog says it does. Stat failures here are evidence of absence, not
/// errors.
fn candidate_missing(
    fs: &dyn ScanFs,
    candidate: &CatFile,
    new_path: &Path,
    scan_filters: &[Arc<dyn PathFilter>],
) -> bool {
    if fs.lstat(&candidate.path).is_err() {
        return true;
    }
    // Case-only rename on a case-insensitive filesystem: the old path
    // still stats (it aliases the new one), but it is not a live sibling.
    if paths::eq_ignore_case(&candidate.path, new_path) && !fs.is_case_sensitive(new_path) {
        return true;
    }
    // Library-path change: the candidate's location is no longer scanned.
    if !scan_filters.is_empty() && !filters::evaluate(scan_filters, &candidate.path, None).accepted
    {
        return true;
    }
    false
}

fn rename_file(
    txn: &ScanTxn<'_>,
    pipeline: &ScanPipeline,
    cache: &FolderCache,
    fs: &dyn ScanFs,
    old: CatFile,
    base: &CatFile,
    scanned: &ScannedFile,
) -> Result<FileOutcome> {
    let old_snapshot = old.clone();

    // The old row survives with id and created_at intact; everything else
    // comes from the new snapshot, and the fingerprint set is superseded
    // wholesale by the freshly computed one.
    let mut file = old;
    file.path = base.path.clone();
    file.basename = base.basename.clone();
    file.parent_folder_id = require_parent(txn, cache, fs, &base.path, scanned.zip_file_id)?;
    file.zip_file_id = scanned.zip_file_id;
    file.size = base.size;
    file.mod_time = base.mod_time;
    file.metadata = base.metadata.clone();
    file.fingerprints = base.fingerprints.clone();
    file.updated_at = model::now_secs();
    txn.files().update(&file)?;

    transfer_zip_hierarchy(txn, file.id, &old_snapshot.path, &file.path)?;
    pipeline.run_handlers(txn, &file, Some(&old_snapshot))?;

    let old_display = old_snapshot.path.display().to_string();
    let new_display = file.path.display().to_string();
    txn.on_commit(move || info!("{old_display} moved to {new_display}. Updating path..."));

    Ok(FileOutcome {
        file,
        new: false,
        renamed: true,
        updated: false,
    })
}

/// After an archive file moved, rewrite the stored paths of everything
/// mounted under it, recursing through nested archive scopes.
fn transfer_zip_hierarchy(
    txn: &ScanTxn<'_>,
    zip_file_id: FileId,
    old_prefix: &Path,
    new_prefix: &Path,
) -> Result<()> {
    for mut folder in txn.folders().find_by_zip_file_id(zip_file_id)? {
        if let Some(rebased) = paths::rebase(&folder.path, old_prefix, new_prefix) {
            folder.path = rebased;
            folder.updated_at = model::now_secs();
            txn.folders().update(&folder)?;
        }
    }
    for mut inner in txn.files().find_by_zip_file_id(zip_file_id)? {
        if let Some(rebased) = paths::rebase(&inner.path, old_prefix, new_prefix) {
            let inner_old = inner.path.clone();
            inner.path = rebased;
            inner.basename = paths::basename(&inner.path);
            inner.updated_at = model::now_secs();
            txn.files().update(&inner)?;
            transfer_zip_hierarchy(txn, inner.id, &inner_old, &inner.path)?;
        }
    }
    Ok(())
}

/// Resolve the parent folder id for a file; files must always have one.
fn require_parent(
    txn: &ScanTxn<'_>,
    cache: &FolderCache,
    fs: &dyn ScanFs,
    path: &Path,
    zip_scope: Option<FileId>,
) -> Result<FolderId> {
    let Some(dir) = paths::dirname(path) else {
        return Err(ScanError::MissingParentFolder {
            path: path.to_path_buf(),
        });
    };
    if let Some(id) = cache.get(dir, zip_scope) {
        return Ok(id);
    }
    let found = match txn.folders().find_by_path(dir, true)? {
        Some(folder) => Some(folder),
        None if !fs.is_case_sensitive(dir) => txn.folders().find_by_path(dir, false)?,
        None => None,
    };
    found
        .map(|f| f.id)
        .ok_or_else(|| ScanError::MissingParentFolder {
            path: path.to_path_buf(),
        })
}
