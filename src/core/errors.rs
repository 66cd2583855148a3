//! SCN-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Top-level error type for shelfscan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("[SCN-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SCN-1002] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SCN-2101] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[SCN-2102] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SCN-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SCN-3002] archive failure at {path}: {details}")]
    Archive { path: PathBuf, details: String },

    #[error("[SCN-3003] fingerprint failure for {path}: {details}")]
    Fingerprint { path: PathBuf, details: String },

    #[error("[SCN-3004] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[SCN-4001] decorator {name} failed for {path}: {details}")]
    Decorator {
        name: String,
        path: PathBuf,
        details: String,
    },

    #[error("[SCN-4002] handler {name} failed for {path}: {details}")]
    Handler {
        name: String,
        path: PathBuf,
        details: String,
    },

    #[error("[SCN-4003] no parent folder entry for {path}")]
    MissingParentFolder { path: PathBuf },

    #[error("[SCN-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ScanError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SCN-1001",
            Self::ConfigParse { .. } => "SCN-1002",
            Self::Sql { .. } => "SCN-2101",
            Self::Serialization { .. } => "SCN-2102",
            Self::Io { .. } => "SCN-3001",
            Self::Archive { .. } => "SCN-3002",
            Self::Fingerprint { .. } => "SCN-3003",
            Self::ChannelClosed { .. } => "SCN-3004",
            Self::Decorator { .. } => "SCN-4001",
            Self::Handler { .. } => "SCN-4002",
            Self::MissingParentFolder { .. } => "SCN-4003",
            Self::Runtime { .. } => "SCN-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Sql { .. } | Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<rusqlite::Error> for ScanError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
