//! Commit-scan feed: the externally produced, possibly stale catalog of
//! candidate commits per alias.
//!
//! ```text
//! {"reports": {"<alias>": {"commits": [{"sha": "...", "sha_full": "...",
//!                                       "markers": [...], "changed_paths": [...]}]}}}
//! ```
//!
//! The feed is optional. A missing file is an empty catalog; entries that are
//! not objects are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::document::read_document;
use crate::error::ConfigError;
use crate::types::{Alias, CommitRecord};

/// Commits per alias, newest first as delivered by the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitCatalog {
    reports: BTreeMap<Alias, Vec<CommitRecord>>,
}

impl CommitCatalog {
    pub fn new(reports: BTreeMap<Alias, Vec<CommitRecord>>) -> Self {
        Self { reports }
    }

    /// Fed commits for `alias`; empty when the feed has no entry.
    pub fn commits(&self, alias: &Alias) -> &[CommitRecord] {
        self.reports.get(alias).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

/// Load the feed at `path`. Missing file ⇒ empty catalog.
pub fn load_commit_catalog_at(path: &Path) -> Result<CommitCatalog, ConfigError> {
    let doc = match read_document(path) {
        Ok(doc) => doc,
        Err(ConfigError::NotFound { .. }) => {
            tracing::debug!("commit feed {} absent; using empty history", path.display());
            return Ok(CommitCatalog::default());
        }
        Err(e) => return Err(e),
    };

    let mut reports = BTreeMap::new();
    let Some(by_alias) = doc.get("reports").and_then(Value::as_object) else {
        return Ok(CommitCatalog::default());
    };
    for (alias, report) in by_alias {
        let commits = report
            .get("commits")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.is_object())
                    .filter_map(|row| serde_json::from_value::<CommitRecord>(row.clone()).ok())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        reports.insert(Alias::from(alias.as_str()), commits);
    }
    Ok(CommitCatalog { reports })
}
