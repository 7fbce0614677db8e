//! Harvest core library: domain types, configuration loading, commit selection.
//!
//! - [`types`]: repository / harvest specs, sync rules, results
//! - [`registry`]: alias → upstream coordinates, branch pin write-back
//! - [`harvest_map`]: per-alias harvest configuration
//! - [`feed`]: externally produced commit catalog
//! - [`select`]: Commit Selector
//! - [`options`]: run parameters
//! - [`error`]: [`ConfigError`]

pub mod document;
pub mod error;
pub mod feed;
pub mod harvest_map;
pub mod options;
pub mod registry;
pub mod select;
pub mod types;

pub use error::ConfigError;
pub use feed::CommitCatalog;
pub use harvest_map::AliasFilter;
pub use options::RunOptions;
pub use registry::Registry;
pub use select::{select_commits, Selection};
pub use types::{
    Alias, ChangedPathRule, CommitRecord, Diagnostic, DiagnosticKind, HarvestSpec, PathCopyRule,
    RefSelector, RepoOutcome, RepoStatus, RepositorySpec, RuleKind, SyncResult, SyncRule,
    SyncStatus,
};
