//! Error types for harvest-report.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while building, rendering or reading reports.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (report payload or tera context).
    #[error("report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A previously written report could not be parsed.
    #[error("invalid report at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// Filesystem error while writing or reading a report.
    #[error("report io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.into(),
        source,
    }
}
