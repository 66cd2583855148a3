//! Decorator, filter, and handler capability traits and their composition.
//!
//! All three are single-method capabilities composed via ordered vectors;
//! the reconciler invokes them at fixed points of the file state machine.

use std::sync::Arc;

use crate::catalog::ScanTxn;
use crate::core::errors::{Result, ScanError};
use crate::fsys::ScanFs;
use crate::model::CatFile;
use crate::scanner::filters::PathFilter;
use crate::scanner::fingerprint::{FingerprintCalculator, StdCalculator};

/// Post-identification filter over catalog file records.
pub trait Filter: Send + Sync {
    /// Whether the file is in scope.
    fn accept(&self, file: &CatFile) -> bool;
}

/// Enriches a file record with format-specific metadata.
pub trait Decorator: Send + Sync {
    /// Stable name, used in error reports.
    fn name(&self) -> &'static str;

    /// Return the (possibly substituted) file. Errors are fatal for the
    /// file being processed; nothing partial is persisted.
    fn decorate(&self, fs: &dyn ScanFs, file: CatFile) -> Result<CatFile>;

    /// Whether this decorator's metadata is absent from an otherwise
    /// unchanged file (triggers repair).
    fn is_missing_metadata(&self, fs: &dyn ScanFs, file: &CatFile) -> bool {
        let _ = (fs, file);
        false
    }
}

/// Downstream effect invoked inside the persistence transaction.
pub trait Handler: Send + Sync {
    /// Stable name, used in error reports.
    fn name(&self) -> &'static str;

    /// React to a created/updated/renamed file. `old_file` carries the
    /// pre-change snapshot for updates and renames. An error rolls back
    /// the whole transaction.
    fn handle(&self, txn: &ScanTxn<'_>, new_file: &CatFile, old_file: Option<&CatFile>)
    -> Result<()>;
}

/// A decorator gated by a filter: runs only for accepted files.
pub struct FilteredDecorator {
    filter: Arc<dyn Filter>,
    inner: Arc<dyn Decorator>,
}

impl FilteredDecorator {
    /// Gate `inner` behind `filter`.
    #[must_use]
    pub fn new(filter: Arc<dyn Filter>, inner: Arc<dyn Decorator>) -> Self {
        Self { filter, inner }
    }
}

impl Decorator for FilteredDecorator {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn decorate(&self, fs: &dyn ScanFs, file: CatFile) -> Result<CatFile> {
        if self.filter.accept(&file) {
            self.inner.decorate(fs, file)
        } else {
            Ok(file)
        }
    }

    fn is_missing_metadata(&self, fs: &dyn ScanFs, file: &CatFile) -> bool {
        self.filter.accept(file) && self.inner.is_missing_metadata(fs, file)
    }
}

/// The configured capability objects driving a scan.
#[derive(Clone)]
pub struct ScanPipeline {
    /// Pre-scan path filters (walk acceptance and rename-candidate probes).
    pub scan_filters: Vec<Arc<dyn PathFilter>>,
    /// Gate for firing handlers on otherwise unchanged files.
    pub handler_required_filters: Vec<Arc<dyn Filter>>,
    /// Ordered decorator sequence.
    pub decorators: Vec<Arc<dyn Decorator>>,
    /// Ordered handler sequence.
    pub handlers: Vec<Arc<dyn Handler>>,
    /// Fingerprint calculator.
    pub calculator: Arc<dyn FingerprintCalculator>,
}

impl Default for ScanPipeline {
    fn default() -> Self {
        Self {
            scan_filters: Vec::new(),
            handler_required_filters: Vec::new(),
            decorators: Vec::new(),
            handlers: Vec::new(),
            calculator: Arc::new(StdCalculator::default()),
        }
    }
}

impl ScanPipeline {
    /// Run the decorator sequence over `file`, failing fast.
    pub(crate) fn run_decorators(&self, fs: &dyn ScanFs, mut file: CatFile) -> Result<CatFile> {
        for decorator in &self.decorators {
            let path = file.path.clone();
            file = decorator
                .decorate(fs, file)
                .map_err(|e| ScanError::Decorator {
                    name: decorator.name().to_string(),
                    path,
                    details: e.to_string(),
                })?;
        }
        Ok(file)
    }

    /// Whether any decorator reports missing metadata for `file`.
    pub(crate) fn any_missing_metadata(&self, fs: &dyn ScanFs, file: &CatFile) -> bool {
        self.decorators
            .iter()
            .any(|d| d.is_missing_metadata(fs, file))
    }

    /// Run the handler sequence inside `txn`, failing fast.
    pub(crate) fn run_handlers(
        &self,
        txn: &ScanTxn<'_>,
        new_file: &CatFile,
        old_file: Option<&CatFile>,
    ) -> Result<()> {
        for handler in &self.handlers {
            handler
                .handle(txn, new_file, old_file)
                .map_err(|e| ScanError::Handler {
                    name: handler.name().to_string(),
                    path: new_file.path.clone(),
                    details: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Whether handlers must fire for an unchanged file: at least one
    /// handler-required filter is configured and accepts.
    pub(crate) fn handlers_required(&self, file: &CatFile) -> bool {
        !self.handler_required_filters.is_empty()
            && self.handler_required_filters.iter().any(|f| f.accept(file))
    }
}
