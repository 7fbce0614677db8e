//! Error types for harvest-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or rewriting configuration.
///
/// These are the "gross misconfiguration" class: they halt a run before any
/// alias is processed. Per-alias problems (unknown alias, malformed sync rule
/// entries) are never raised through this type; they travel inside the loaded
/// specs as diagnostics instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error on load, with the file path.
    #[error("failed to parse JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML parse error on load, with the file path and line context.
    #[error("failed to parse YAML at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON serialization error (write-back path).
    #[error("JSON serialization error: {0}")]
    JsonWrite(#[from] serde_json::Error),

    /// YAML serialization error (write-back path).
    #[error("YAML serialization error: {0}")]
    YamlWrite(#[from] serde_yaml::Error),

    /// The file parsed but does not have the expected shape.
    #[error("invalid configuration at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// Two registry rows share the same alias.
    #[error("duplicate alias '{alias}' in registry {path}")]
    DuplicateAlias { path: PathBuf, alias: String },

    /// A required configuration file did not exist.
    #[error("configuration not found at {path}")]
    NotFound { path: PathBuf },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`ConfigError::Invalid`].
pub(crate) fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        path: path.into(),
        reason: reason.into(),
    }
}
