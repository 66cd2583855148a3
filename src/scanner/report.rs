//! Per-scan outcome tallies.

#![allow(missing_docs)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scanner::file::FileOutcome;
use crate::scanner::folder::FolderOutcome;

/// One per-entry failure; the rest of the scan continues around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    pub path: PathBuf,
    pub error: String,
}

/// Counters and failures accumulated over one scan (or one worker's share
/// of it; partial reports merge).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub folders_created: u64,
    pub folders_updated: u64,
    pub folders_moved: u64,
    pub files_new: u64,
    pub files_updated: u64,
    pub files_renamed: u64,
    pub files_unchanged: u64,
    pub errors: Vec<ScanIssue>,
    pub cancelled: bool,
}

impl ScanReport {
    /// Fold another report (e.g. a worker's tally) into this one.
    pub fn merge(&mut self, other: Self) {
        self.folders_created += other.folders_created;
        self.folders_updated += other.folders_updated;
        self.folders_moved += other.folders_moved;
        self.files_new += other.files_new;
        self.files_updated += other.files_updated;
        self.files_renamed += other.files_renamed;
        self.files_unchanged += other.files_unchanged;
        self.errors.extend(other.errors);
        self.cancelled |= other.cancelled;
    }

    /// Record a folder reconciliation outcome.
    pub(crate) fn record_folder(&mut self, outcome: &FolderOutcome) {
        if outcome.created {
            self.folders_created += 1;
        } else if outcome.moved {
            self.folders_moved += 1;
        } else if outcome.updated {
            self.folders_updated += 1;
        }
    }

    /// Record a file reconciliation outcome.
    pub(crate) fn record_file(&mut self, outcome: &FileOutcome) {
        if outcome.new {
            self.files_new += 1;
        } else if outcome.renamed {
            self.files_renamed += 1;
        } else if outcome.updated {
            self.files_updated += 1;
        } else {
            self.files_unchanged += 1;
        }
    }

    /// Record a per-entry failure.
    pub(crate) fn record_error(&mut self, path: PathBuf, error: &crate::core::errors::ScanError) {
        self.errors.push(ScanIssue {
            path,
            error: error.to_string(),
        });
    }

    /// Number of catalog mutations observed.
    #[must_use]
    pub fn total_changes(&self) -> u64 {
        self.folders_created
            + self.folders_updated
            + self.folders_moved
            + self.files_new
            + self.files_updated
            + self.files_renamed
    }

    /// Whether the scan changed nothing and hit no errors.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.total_changes() == 0 && self.errors.is_empty()
    }

    /// Pretty JSON rendering for logs and operator tooling.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!("{{\n  \"error\": \"{e}\"\n}}"))
    }
}
