//! Error types for harvest-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use harvest_core::ConfigError;

/// All errors that can arise while mirroring, resolving or writing.
///
/// Anything returned through `Err` is the fatal channel: at alias level it
/// aborts that alias, at rule level it becomes an `error` result.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Gross misconfiguration, or a configuration file failed to load.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No harvest spec survived alias filtering and enablement.
    #[error("no repository entries selected from the harvest map")]
    EmptySelection,

    /// Registry row that cannot be mirrored.
    #[error("configuration error for '{alias}': {reason}")]
    Configuration { alias: String, reason: String },

    /// No branch or head could be resolved on the remote.
    #[error("could not resolve a branch for '{alias}' (tried {tried})")]
    RemoteResolution { alias: String, tried: String },

    /// The required branch fetch failed.
    #[error("fetch of '{refspec}' failed: {reason}")]
    Fetch { refspec: String, reason: String },

    /// A source blob could not be read at the resolved revision.
    #[error("cannot read '{path}' at '{rev}': {reason}")]
    BlobRead {
        rev: String,
        path: String,
        reason: String,
    },

    /// A materialized target normalizes outside the sandbox root.
    #[error("target escapes repo root: {target}")]
    PathEscape { target: String },

    /// A rewrite rule is not idempotent for this input.
    #[error("canonicalization of '{target}' is not idempotent (rule '{rule}')")]
    Canonicalization { target: String, rule: String },

    /// A git command exited non-zero.
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// A git command exceeded its wall-clock budget and was killed.
    #[error("git {command} timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// The git binary could not be started.
    #[error("could not run git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (commit artifacts).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`HarvestError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HarvestError {
    HarvestError::Io {
        path: path.into(),
        source,
    }
}
