//! Depth-first traversal: filter acceptance, entry classification, and
//! archive descent.
//!
//! The walker runs on the scan thread and reconciles folders inline so a
//! folder's id is committed before any contained file reaches the worker
//! pool. Ordinary files are handed to the bounded file channel; archive
//! files are reconciled inline and then walked internally with the
//! archive's id as the entries' zip scope.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel as channel;

use crate::core::cancel::CancelToken;
use crate::core::errors::{Result, ScanError};
use crate::fsys::{EntryInfo, ScanFs};
use crate::model::FileId;
use crate::scanner::{ScanCtx, file, filters, folder, report::ScanReport};

/// One unit of file work handed from the walker to a reconciler worker.
#[derive(Clone)]
pub struct ScannedFile {
    /// Filesystem the path lives on (native or an archive overlay).
    pub fs: Arc<dyn ScanFs>,
    /// Absolute path of the entry.
    pub path: PathBuf,
    /// Stat data captured during the walk.
    pub info: EntryInfo,
    /// Archive scope, when the file lives inside a mounted zip.
    pub zip_file_id: Option<FileId>,
}

impl std::fmt::Debug for ScannedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannedFile")
            .field("path", &self.path)
            .field("zip_file_id", &self.zip_file_id)
            .finish_non_exhaustive()
    }
}

pub(crate) struct Walker {
    cx: ScanCtx,
    cancel: CancelToken,
    file_tx: channel::Sender<ScannedFile>,
    report: ScanReport,
}

impl Walker {
    pub(crate) fn new(cx: ScanCtx, cancel: CancelToken, file_tx: channel::Sender<ScannedFile>) -> Self {
        Self {
            cx,
            cancel,
            file_tx,
            report: ScanReport::default(),
        }
    }

    /// Walk every configured root; returns this thread's tally.
    pub(crate) fn run(mut self, root_fs: &Arc<dyn ScanFs>) -> ScanReport {
        let roots = self.cx.options.roots.clone();
        for root in &roots {
            if self.cancel.is_cancelled() {
                break;
            }
            // Vanished roots are skipped; scans of sibling roots continue.
            let Ok(info) = root_fs.stat(root) else {
                continue;
            };
            if info.is_dir {
                self.handle_dir(root_fs, root, &info, None, None);
                if let Err(err) = self.walk_children(root_fs, root, None) {
                    self.report.record_error(root.clone(), &err);
                }
            } else {
                self.classify_entry(root_fs, root.clone(), info, None);
            }
        }
        self.report
    }

    fn walk_children(
        &mut self,
        fs: &Arc<dyn ScanFs>,
        root: &Path,
        zip_scope: Option<FileId>,
    ) -> Result<()> {
        let entries = fs.walk(root).map_err(|source| ScanError::io(root, source))?;
        let mut pruned: Vec<PathBuf> = Vec::new();
        for item in entries {
            if self.cancel.is_cancelled() {
                break;
            }
            let Ok((path, info)) = item else {
                continue;
            };
            if pruned.iter().any(|p| path.starts_with(p)) {
                continue;
            }
            let eval = filters::evaluate(&self.cx.pipeline.scan_filters, &path, Some(&info));
            if !eval.accepted {
                if info.is_dir && eval.prune {
                    pruned.push(path);
                }
                continue;
            }
            self.classify_entry(fs, path, info, zip_scope);
        }
        Ok(())
    }

    fn classify_entry(
        &mut self,
        fs: &Arc<dyn ScanFs>,
        path: PathBuf,
        info: EntryInfo,
        zip_scope: Option<FileId>,
    ) {
        if info.is_dir {
            self.handle_dir(fs, &path, &info, zip_scope, zip_scope);
        } else if self.cx.options.is_zip_extension(&path) {
            if let Err(err) = self.handle_archive(fs, &path, &info, zip_scope) {
                self.report.record_error(path, &err);
            }
        } else {
            let item = ScannedFile {
                fs: Arc::clone(fs),
                path,
                info,
                zip_file_id: zip_scope,
            };
            if let Err(channel::SendError(item)) = self.file_tx.send(item) {
                self.report.record_error(
                    item.path,
                    &ScanError::ChannelClosed {
                        component: "file worker pool",
                    },
                );
            }
        }
    }

    fn handle_dir(
        &mut self,
        fs: &Arc<dyn ScanFs>,
        path: &Path,
        info: &EntryInfo,
        zip_scope: Option<FileId>,
        parent_scope: Option<FileId>,
    ) {
        match folder::reconcile_folder(&mut self.cx, fs.as_ref(), path, info, zip_scope, parent_scope)
        {
            Ok(outcome) => {
                self.cx.cache.insert(path, zip_scope, outcome.folder.id);
                self.report.record_folder(&outcome);
            }
            Err(err) => self.report.record_error(path.to_path_buf(), &err),
        }
    }

    /// Reconcile an archive as an ordinary file, then walk its interior
    /// with the archive's id as zip scope.
    fn handle_archive(
        &mut self,
        fs: &Arc<dyn ScanFs>,
        path: &Path,
        info: &EntryInfo,
        zip_scope: Option<FileId>,
    ) -> Result<()> {
        let item = ScannedFile {
            fs: Arc::clone(fs),
            path: path.to_path_buf(),
            info: *info,
            zip_file_id: zip_scope,
        };
        let outcome = file::reconcile_file(&mut self.cx, &item)?;
        let zip_file_id = outcome.file.id;
        self.report.record_file(&outcome);

        let zip_fs = fs.open_zip(path)?;
        // The mount folder roots the archive's internal hierarchy; its
        // parent lives in the enclosing scope.
        let mount_info = EntryInfo {
            size: 0,
            mod_time: info.mod_time,
            is_dir: true,
            is_symlink: false,
        };
        self.handle_dir(&zip_fs, path, &mount_info, Some(zip_file_id), zip_scope);
        self.walk_children(&zip_fs, path, Some(zip_file_id))
    }
}
