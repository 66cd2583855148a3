//! Pre-scan path filters with explicit prune semantics.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::core::errors::{Result, ScanError};
use crate::fsys::EntryInfo;

/// A filter's answer for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Accept the entry.
    Accept,
    /// Reject the entry; a rejected directory still descends.
    Skip,
    /// Reject the entry; a rejected directory also prunes its subtree.
    Prune,
}

/// Pre-scan filter over raw paths.
///
/// `info` is present during a walk and absent when probing catalog rows
/// whose on-disk state is unknown (rename detection).
pub trait PathFilter: Send + Sync {
    /// Judge one path.
    fn accept(&self, path: &Path, info: Option<&EntryInfo>) -> Verdict;
}

/// Combined answer of a filter set for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Accepted iff no filters are configured or any filter accepts.
    pub accepted: bool,
    /// For rejected directories: whether any filter requested pruning.
    pub prune: bool,
}

/// Evaluate a filter set. An empty set accepts everything.
pub fn evaluate(
    filters: &[Arc<dyn PathFilter>],
    path: &Path,
    info: Option<&EntryInfo>,
) -> Evaluation {
    if filters.is_empty() {
        return Evaluation {
            accepted: true,
            prune: false,
        };
    }
    let mut prune = false;
    for filter in filters {
        match filter.accept(path, info) {
            Verdict::Accept => {
                return Evaluation {
                    accepted: true,
                    prune: false,
                };
            }
            Verdict::Skip => {}
            Verdict::Prune => prune = true,
        }
    }
    Evaluation {
        accepted: false,
        prune,
    }
}

// ──────────────────── stock filters ────────────────────

/// Accept files by extension (lowercase, no dot); directories always
/// accepted so the walk descends.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: BTreeSet<String>,
}

impl ExtensionFilter {
    /// Build from extension labels; case is folded.
    #[must_use]
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(extensions: I) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.into().to_lowercase())
                .collect(),
        }
    }
}

impl PathFilter for ExtensionFilter {
    fn accept(&self, path: &Path, info: Option<&EntryInfo>) -> Verdict {
        if info.is_some_and(|i| i.is_dir) {
            return Verdict::Accept;
        }
        let matched = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext));
        if matched { Verdict::Accept } else { Verdict::Skip }
    }
}

/// Reject paths matching any of the given patterns; everything else is
/// accepted. Matching directories prune their subtree when configured.
#[derive(Debug, Clone)]
pub struct ExcludePatternFilter {
    patterns: Vec<Regex>,
    prune_directories: bool,
}

impl ExcludePatternFilter {
    /// Compile the given patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S], prune_directories: bool) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| ScanError::InvalidConfig {
                    details: format!("bad exclude pattern {:?}: {e}", p.as_ref()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns: compiled,
            prune_directories,
        })
    }
}

impl PathFilter for ExcludePatternFilter {
    fn accept(&self, path: &Path, info: Option<&EntryInfo>) -> Verdict {
        let haystack = path.to_string_lossy();
        let excluded = self.patterns.iter().any(|p| p.is_match(&haystack));
        if !excluded {
            return Verdict::Accept;
        }
        if self.prune_directories && info.is_none_or(|i| i.is_dir) {
            Verdict::Prune
        } else {
            Verdict::Skip
        }
    }
}

/// Accept only paths inside the configured library prefixes.
///
/// Ancestors of a prefix are accepted so a walk can reach the library;
/// paths outside prune.
#[derive(Debug, Clone)]
pub struct PrefixFilter {
    prefixes: Vec<PathBuf>,
}

impl PrefixFilter {
    /// Build from absolute prefixes.
    #[must_use]
    pub fn new<I: IntoIterator<Item = PathBuf>>(prefixes: I) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
        }
    }
}

impl PathFilter for PrefixFilter {
    fn accept(&self, path: &Path, _info: Option<&EntryInfo>) -> Verdict {
        let inside = self.prefixes.iter().any(|p| path.starts_with(p));
        if inside {
            return Verdict::Accept;
        }
        let ancestor = self.prefixes.iter().any(|p| p.starts_with(path));
        if ancestor { Verdict::Accept } else { Verdict::Prune }
    }
}
