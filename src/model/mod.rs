//! Catalog entity model: folders, files, and their fingerprints.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::core::paths;

/// Monotonic folder identity assigned by the catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct FolderId(pub i64);

/// Monotonic file identity assigned by the catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct FileId(pub i64);

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current time truncated to whole seconds.
///
/// The catalog stores second-precision timestamps; truncating at the source
/// keeps in-memory rows equal to their persisted form.
#[must_use]
pub fn now_secs() -> DateTime<Utc> {
    truncate_to_secs(Utc::now())
}

/// Drop sub-second precision from a timestamp.
#[must_use]
pub fn truncate_to_secs(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(dt.timestamp(), 0)
        .single()
        .unwrap_or(dt)
}

/// Convert a filesystem timestamp to the catalog's second precision.
#[must_use]
pub fn system_time_to_secs(t: SystemTime) -> DateTime<Utc> {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default())
}

/// Render a timestamp in the catalog's storage form (RFC 3339, seconds).
#[must_use]
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a timestamp from the catalog's storage form.
#[must_use]
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

// ──────────────────── fingerprints ────────────────────

/// Content digest family.
///
/// `Phash` exists so collaborator-provided calculators can store perceptual
/// digests; the stock calculator never produces one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintKind {
    Oshash,
    Md5,
    Sha256,
    Phash,
}

impl FingerprintKind {
    /// Stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oshash => "oshash",
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Phash => "phash",
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FingerprintKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oshash" => Ok(Self::Oshash),
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "phash" => Ok(Self::Phash),
            other => Err(format!("unknown fingerprint kind: {other:?}")),
        }
    }
}

/// A typed content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub kind: FingerprintKind,
    pub value: String,
}

impl Fingerprint {
    /// Build a fingerprint from its parts.
    #[must_use]
    pub fn new(kind: FingerprintKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Set of fingerprints keyed by kind; at most one value per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSet {
    by_kind: BTreeMap<FingerprintKind, String>,
}

impl FingerprintSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the fingerprint for its kind.
    pub fn insert(&mut self, fp: Fingerprint) {
        self.by_kind.insert(fp.kind, fp.value);
    }

    /// Value for a kind, if present.
    #[must_use]
    pub fn get(&self, kind: FingerprintKind) -> Option<&str> {
        self.by_kind.get(&kind).map(String::as_str)
    }

    /// Remove a kind's fingerprint, returning the removed value.
    pub fn remove(&mut self, kind: FingerprintKind) -> Option<String> {
        self.by_kind.remove(&kind)
    }

    /// Whether a kind is present.
    #[must_use]
    pub fn contains(&self, kind: FingerprintKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Iterate fingerprints in kind order.
    pub fn iter(&self) -> impl Iterator<Item = Fingerprint> + '_ {
        self.by_kind
            .iter()
            .map(|(kind, value)| Fingerprint::new(*kind, value.clone()))
    }

    /// Number of fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

}

impl FromIterator<Fingerprint> for FingerprintSet {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        let mut set = Self::new();
        for fp in iter {
            set.insert(fp);
        }
        set
    }
}

// ──────────────────── folders and files ────────────────────

/// A catalog folder entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub path: PathBuf,
    pub parent_folder_id: Option<FolderId>,
    /// Set iff the folder lives inside an archive; equals the archive file's id.
    pub zip_file_id: Option<FileId>,
    pub mod_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    /// A fresh, unpersisted folder row (id assigned by the catalog on create).
    #[must_use]
    pub fn new(
        path: PathBuf,
        parent_folder_id: Option<FolderId>,
        zip_file_id: Option<FileId>,
        mod_time: DateTime<Utc>,
    ) -> Self {
        let now = now_secs();
        Self {
            id: FolderId::default(),
            path,
            parent_folder_id,
            zip_file_id,
            mod_time: truncate_to_secs(mod_time),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A catalog file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatFile {
    pub id: FileId,
    pub path: PathBuf,
    pub basename: String,
    pub parent_folder_id: FolderId,
    /// Set iff the file lives inside an archive; equals the archive file's id.
    pub zip_file_id: Option<FileId>,
    /// Size in bytes; symlinks are resolved to the target's size.
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub fingerprints: FingerprintSet,
    /// Decorator-populated subtype attributes (codec, dimensions, ...).
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatFile {
    /// A fresh, unpersisted file snapshot for a path observed on disk.
    #[must_use]
    pub fn snapshot(
        path: PathBuf,
        zip_file_id: Option<FileId>,
        size: u64,
        mod_time: DateTime<Utc>,
    ) -> Self {
        let now = now_secs();
        let basename = paths::basename(&path);
        Self {
            id: FileId::default(),
            path,
            basename,
            parent_folder_id: FolderId::default(),
            zip_file_id,
            size,
            mod_time: truncate_to_secs(mod_time),
            fingerprints: FingerprintSet::new(),
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `other` shares this file's archive scope.
    #[must_use]
    pub fn same_zip_scope(&self, zip_file_id: Option<FileId>) -> bool {
        self.zip_file_id == zip_file_id
    }
}
