//! Scan options: TOML file + smart defaults.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, ScanError};

/// Serializable scan options.
///
/// Runtime capability objects (filters, decorators, handlers) live in
/// [`crate::scanner::ScanPipeline`]; this struct carries only the
/// data-shaped knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanOptions {
    /// Root directories to scan.
    pub roots: Vec<PathBuf>,
    /// File extensions (lowercase, without dot) treated as mountable archives.
    pub zip_extensions: BTreeSet<String>,
    /// Force re-processing of files whose stat data is unchanged.
    pub rescan: bool,
    /// Compute an MD5 fingerprint in addition to oshash.
    pub calculate_md5: bool,
    /// Compute a SHA-256 fingerprint in addition to oshash.
    pub calculate_sha256: bool,
    /// Number of file reconciler workers.
    pub parallelism: usize,
    /// Bound of the walker→worker file channel.
    pub queue_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            zip_extensions: BTreeSet::from(["zip".to_string()]),
            rescan: false,
            calculate_md5: false,
            calculate_sha256: false,
            parallelism: 4,
            queue_depth: 256,
        }
    }
}

impl ScanOptions {
    /// Parse options from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let options: Self = toml::from_str(raw)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ScanError::io(path, source))?;
        Self::from_toml_str(&raw)
    }

    /// Validate invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(ScanError::InvalidConfig {
                details: "at least one scan root is required".to_string(),
            });
        }
        for root in &self.roots {
            if !root.is_absolute() {
                return Err(ScanError::InvalidConfig {
                    details: format!("scan root must be absolute: {}", root.display()),
                });
            }
        }
        for ext in &self.zip_extensions {
            if ext.starts_with('.') || ext.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(ScanError::InvalidConfig {
                    details: format!("zip extension must be lowercase without dot: {ext:?}"),
                });
            }
        }
        Ok(())
    }

    /// Worker count, never zero.
    #[must_use]
    pub fn effective_parallelism(&self) -> usize {
        self.parallelism.max(1)
    }

    /// Whether `path` carries a configured archive extension (case-insensitive).
    #[must_use]
    pub fn is_zip_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.zip_extensions.contains(&ext))
    }
}
