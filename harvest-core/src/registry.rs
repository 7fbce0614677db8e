//! Repository registry: alias → upstream coordinates.
//!
//! # File shape
//!
//! ```text
//! [
//!   {"alias": "coffin_wine", "owner": "coffincolors", "repo": "wine",
//!    "branch": "arm64ec", "enabled_default": true,
//!    "focus_paths": ["dlls/ntdll/loader.c"], "pinned_commits": []}
//! ]
//! ```
//!
//! A `{"repos": [...]}` wrapper is accepted too. Rows missing `alias`, `owner`
//! or `repo` are skipped with a warning; a duplicated alias is a hard error.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::Value;

use crate::document::{read_document, rows, write_document};
use crate::error::{invalid, ConfigError};
use crate::types::{Alias, RepositorySpec};

/// Ordered, alias-unique set of repository specs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    repos: Vec<RepositorySpec>,
}

impl Registry {
    /// Build a registry. Returns the first repeated alias on conflict.
    pub fn new(repos: Vec<RepositorySpec>) -> Result<Self, Alias> {
        let mut seen = BTreeSet::new();
        for repo in &repos {
            if !seen.insert(&repo.alias) {
                return Err(repo.alias.clone());
            }
        }
        Ok(Self { repos })
    }

    pub fn get(&self, alias: &Alias) -> Option<&RepositorySpec> {
        self.repos.iter().find(|r| &r.alias == alias)
    }

    pub fn contains(&self, alias: &Alias) -> bool {
        self.get(alias).is_some()
    }

    /// Specs in file order.
    pub fn iter(&self) -> impl Iterator<Item = &RepositorySpec> {
        self.repos.iter()
    }

    /// Specs sorted by alias.
    pub fn sorted(&self) -> Vec<&RepositorySpec> {
        let mut out: Vec<_> = self.repos.iter().collect();
        out.sort_by(|a, b| a.alias.cmp(&b.alias));
        out
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

/// Load the registry at `path`.
pub fn load_registry_at(path: &Path) -> Result<Registry, ConfigError> {
    let doc = read_document(path)?;
    let Some(entries) = rows(&doc, "repos") else {
        return Err(invalid(path, "registry must be an array of repository entries"));
    };

    let mut repos = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let spec = match serde_json::from_value::<RepositorySpec>(entry.clone()) {
            Ok(spec) => spec.normalized(),
            Err(e) => {
                tracing::warn!("registry {}: skipping entry #{index}: {e}", path.display());
                continue;
            }
        };
        if spec.alias.0.is_empty() || spec.owner.is_empty() || spec.repo.is_empty() {
            tracing::warn!(
                "registry {}: skipping entry #{index}: alias, owner and repo are required",
                path.display()
            );
            continue;
        }
        repos.push(spec);
    }

    Registry::new(repos).map_err(|alias| ConfigError::DuplicateAlias {
        path: path.to_path_buf(),
        alias: alias.0,
    })
}

// ---------------------------------------------------------------------------
// Branch pin write-back
// ---------------------------------------------------------------------------

/// One registry `branch` field rewritten from a transfer report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchChange {
    pub alias: Alias,
    /// Previous value; `None` when the row had no branch.
    pub previous: Option<String>,
    pub resolved: String,
}

/// Rewrite `branch` fields in the registry at `path` to the resolved branches.
///
/// Other fields and row order are preserved. With `write == false` the file is
/// left untouched and only the would-be changes are returned.
pub fn pin_branches_at(
    path: &Path,
    resolved: &BTreeMap<Alias, String>,
    write: bool,
) -> Result<Vec<BranchChange>, ConfigError> {
    let mut doc = read_document(path)?;
    let entries = match &mut doc {
        Value::Array(rows) => rows,
        Value::Object(map) => match map.get_mut("repos") {
            Some(Value::Array(rows)) => rows,
            _ => return Err(invalid(path, "registry must be an array of repository entries")),
        },
        _ => return Err(invalid(path, "registry must be an array of repository entries")),
    };

    let mut changes = Vec::new();
    for row in entries.iter_mut() {
        let Some(obj) = row.as_object_mut() else {
            continue;
        };
        let alias = obj
            .get("alias")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if alias.is_empty() {
            continue;
        }
        let alias = Alias::from(alias);
        let Some(target) = resolved.get(&alias).map(|b| b.trim()).filter(|b| !b.is_empty()) else {
            continue;
        };
        let current = obj
            .get("branch")
            .and_then(Value::as_str)
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        if current.as_deref() == Some(target) {
            continue;
        }
        obj.insert("branch".to_string(), Value::String(target.to_string()));
        changes.push(BranchChange {
            alias,
            previous: current,
            resolved: target.to_string(),
        });
    }

    if write && !changes.is_empty() {
        write_document(path, &doc)?;
    }
    Ok(changes)
}
