//! Error types for corpus access, ground truth and benchmark runs.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for shardbench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Backend call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
    Create,
    Open,
    Insert,
    CreateIndex,
    Build,
    Search,
    Close,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendOp::Create => "create",
            BackendOp::Open => "open",
            BackendOp::Insert => "insert",
            BackendOp::CreateIndex => "create_index",
            BackendOp::Build => "build",
            BackendOp::Search => "search",
            BackendOp::Close => "close",
        };
        f.write_str(s)
    }
}

/// Primary error type for shardbench
#[derive(Error, Debug)]
pub enum Error {
    /// No metadata sidecar (or no shards) for the dataset.
    #[error("dataset not found in {dir}: {reason}")]
    DatasetNotFound { dir: PathBuf, reason: String },

    /// No ground-truth sidecar for the dataset label.
    #[error("ground truth not found in {dir} for label '{label}'")]
    GroundTruthNotFound { dir: PathBuf, label: String },

    #[error("invalid dataset metadata {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    /// Shard size or layout inconsistent with the declared dimension.
    #[error("corrupt shard {path}: {reason}")]
    CorruptShard { path: PathBuf, reason: String },

    #[error("query id {id} out of range (corpus has {total_rows} rows)")]
    QueryOutOfRange { id: u64, total_rows: u64 },

    #[error("invalid ground truth {path} line {line}: {reason}")]
    InvalidGroundTruth {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by an index backend.
    #[error("index backend {op} failed: {message}")]
    Backend { op: BackendOp, message: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn corrupt_shard(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Error::CorruptShard {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn backend(op: BackendOp, message: impl fmt::Display) -> Self {
        Error::Backend {
            op,
            message: message.to_string(),
        }
    }

    /// Missing or unreadable dataset sidecars.
    ///
    /// These stop a run before any I/O heavy work starts; there is no
    /// degraded mode.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Error::DatasetNotFound { .. }
                | Error::GroundTruthNotFound { .. }
                | Error::InvalidMetadata { .. }
        )
    }
}
