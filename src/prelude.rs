//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use shelfscan::prelude::*;
//! ```

// Core
pub use crate::core::cancel::CancelToken;
pub use crate::core::config::ScanOptions;
pub use crate::core::errors::{Result, ScanError};

// Catalog
pub use crate::catalog::{Catalog, CatalogConn, ScanTxn};

// Model
pub use crate::model::{
    CatFile, FileId, Fingerprint, FingerprintKind, FingerprintSet, Folder, FolderId,
};

// Filesystem
pub use crate::fsys::{EntryInfo, NativeFs, ScanFs, ZipFs};

// Scanner
pub use crate::scanner::{
    Decorator, ExcludePatternFilter, ExtensionFilter, Filter, FilteredDecorator,
    FingerprintCalculator, Handler, PathFilter, PrefixFilter, ScanPipeline, ScanReport, Scanner,
    StdCalculator, Verdict,
};
