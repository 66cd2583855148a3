//! The scanner core: walker, reconciler state machines, fingerprint
//! orchestration, and the decorator/handler pipeline.
//!
//! One walker thread discovers entries and reconciles folders inline;
//! a bounded pool of workers reconciles files from a crossbeam channel.
//! Every worker holds its own catalog connection; a shared path→id cache
//! (per scan session) spares workers the parent-folder lookups, with
//! catalog fallback on miss.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel as channel;
use parking_lot::RwLock;

use crate::catalog::{Catalog, CatalogConn};
use crate::core::cancel::CancelToken;
use crate::core::config::ScanOptions;
use crate::core::errors::Result;
use crate::fsys::{NativeFs, ScanFs};
use crate::model::{FileId, FolderId};

pub mod file;
pub mod filters;
pub mod fingerprint;
pub mod folder;
pub mod pipeline;
pub mod report;
pub mod walker;

pub use file::FileOutcome;
pub use filters::{ExcludePatternFilter, ExtensionFilter, PathFilter, PrefixFilter, Verdict};
pub use fingerprint::{FingerprintCalculator, StdCalculator};
pub use folder::FolderOutcome;
pub use pipeline::{Decorator, Filter, FilteredDecorator, Handler, ScanPipeline};
pub use report::{ScanIssue, ScanReport};
pub use walker::ScannedFile;

/// Process-local map from folder path (within an archive scope) to its
/// committed id. Written by the walker, read by workers; a miss falls
/// back to a catalog lookup, so lossy reads are harmless. Created fresh
/// per scan session to avoid aliasing across catalog surgery.
#[derive(Debug, Default)]
pub struct FolderCache {
    map: RwLock<HashMap<(PathBuf, Option<FileId>), FolderId>>,
}

impl FolderCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached id for a folder path in the given archive scope.
    #[must_use]
    pub fn get(&self, path: &Path, zip_scope: Option<FileId>) -> Option<FolderId> {
        self.map
            .read()
            .get(&(path.to_path_buf(), zip_scope))
            .copied()
    }

    /// Record a committed folder id.
    pub fn insert(&self, path: &Path, zip_scope: Option<FileId>, id: FolderId) {
        self.map
            .write()
            .insert((path.to_path_buf(), zip_scope), id);
    }
}

/// Everything one scan participant (walker or worker) needs.
pub(crate) struct ScanCtx {
    pub conn: CatalogConn,
    pub options: ScanOptions,
    pub pipeline: Arc<ScanPipeline>,
    pub cache: Arc<FolderCache>,
}

/// The scanner: reconciles configured roots against the catalog.
pub struct Scanner {
    catalog: Catalog,
    options: ScanOptions,
    pipeline: Arc<ScanPipeline>,
    root_fs: Arc<dyn ScanFs>,
}

impl Scanner {
    /// Build a scanner over the native filesystem.
    #[must_use]
    pub fn new(catalog: Catalog, options: ScanOptions, pipeline: ScanPipeline) -> Self {
        Self {
            catalog,
            options,
            pipeline: Arc::new(pipeline),
            root_fs: Arc::new(NativeFs::new()),
        }
    }

    /// Substitute the root filesystem (tests, overlays).
    #[must_use]
    pub fn with_root_fs(mut self, root_fs: Arc<dyn ScanFs>) -> Self {
        self.root_fs = root_fs;
        self
    }

    /// Run one scan session.
    ///
    /// Per-entry failures are recorded in the report and do not stop the
    /// scan; only setup failures (bad options, unreachable catalog)
    /// surface as errors.
    pub fn scan(&self, cancel: &CancelToken) -> Result<ScanReport> {
        self.options.validate()?;
        let cache = Arc::new(FolderCache::new());
        let (file_tx, file_rx) = channel::bounded::<ScannedFile>(self.options.queue_depth.max(1));

        let workers: Vec<_> = (0..self.options.effective_parallelism())
            .map(|_| {
                let file_rx = file_rx.clone();
                let catalog = self.catalog.clone();
                let options = self.options.clone();
                let pipeline = Arc::clone(&self.pipeline);
                let cache = Arc::clone(&cache);
                let cancel = cancel.clone();
                thread::spawn(move || {
                    file_worker(&file_rx, &catalog, options, pipeline, cache, &cancel)
                })
            })
            .collect();
        drop(file_rx);

        let walker_cx = ScanCtx {
            conn: self.catalog.connect()?,
            options: self.options.clone(),
            pipeline: Arc::clone(&self.pipeline),
            cache: Arc::clone(&cache),
        };
        let mut report =
            walker::Walker::new(walker_cx, cancel.clone(), file_tx.clone()).run(&self.root_fs);

        // Closing the channel lets workers drain and exit.
        drop(file_tx);
        for handle in workers {
            if let Ok(tally) = handle.join() {
                report.merge(tally);
            }
        }
        report.cancelled = cancel.is_cancelled();
        Ok(report)
    }
}

/// Worker loop: reconcile files until the channel closes. On cancel, the
/// queue is drained without processing so the walker never blocks on a
/// full channel.
fn file_worker(
    file_rx: &channel::Receiver<ScannedFile>,
    catalog: &Catalog,
    options: ScanOptions,
    pipeline: Arc<ScanPipeline>,
    cache: Arc<FolderCache>,
    cancel: &CancelToken,
) -> ScanReport {
    let mut report = ScanReport::default();
    let mut cx = match catalog.connect() {
        Ok(conn) => ScanCtx {
            conn,
            options,
            pipeline,
            cache,
        },
        Err(err) => {
            report.record_error(catalog.path().to_path_buf(), &err);
            return report;
        }
    };
    while let Ok(scanned) = file_rx.recv() {
        if cancel.is_cancelled() {
            continue;
        }
        let path = scanned.path.clone();
        match file::reconcile_file(&mut cx, &scanned) {
            Ok(outcome) => report.record_file(&outcome),
            Err(err) => report.record_error(path, &err),
        }
    }
    report
}
