//! Per-commit audit artifacts.
//!
//! ```text
//! <out>/<alias>/commits/<sha12>/
//!   meta.json      {"sha": ..., "changed_paths": [...]}
//!   commit.patch   `git show --patch` limited to the harvested paths
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use harvest_core::{Diagnostic, DiagnosticKind};

use crate::error::HarvestError;
use crate::source::BlobSource;
use crate::writer::{contained_path, write_if_changed};

#[derive(Debug, Serialize)]
struct CommitMeta<'a> {
    sha: &'a str,
    changed_paths: &'a [String],
}

/// Keep the paths equal to or under one of `harvest_paths`. No harvest paths
/// keeps everything.
pub fn filter_harvested(changed: &[String], harvest_paths: &[String]) -> Vec<String> {
    let prefixes: Vec<&str> = harvest_paths
        .iter()
        .map(|p| p.trim().trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect();
    changed
        .iter()
        .filter(|p| !p.is_empty())
        .filter(|p| {
            prefixes.is_empty()
                || prefixes.iter().any(|prefix| {
                    p.as_str() == *prefix
                        || p.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
                })
        })
        .cloned()
        .collect()
}

/// Write `meta.json` and `commit.patch` for one selected commit.
///
/// A patch that cannot be produced leaves an empty `commit.patch` and a
/// diagnostic; only filesystem failures are returned as errors.
pub fn write_commit_artifacts<S: BlobSource>(
    source: &S,
    alias_out: &Path,
    sha: &str,
    changed: &[String],
    harvest_paths: &[String],
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<PathBuf, HarvestError> {
    let short: String = sha.chars().take(12).collect();
    let dir = contained_path(&alias_out.join("commits"), &short)?;

    let touched = filter_harvested(changed, harvest_paths);
    let meta = CommitMeta {
        sha,
        changed_paths: &touched,
    };
    let mut json = serde_json::to_string_pretty(&meta)?;
    json.push('\n');
    write_if_changed(&dir.join("meta.json"), json.as_bytes())?;

    let patch = match source.commit_patch(sha, &touched) {
        Ok(patch) => patch,
        Err(e) => {
            tracing::warn!("commit {short}: patch not captured: {e}");
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::CommitArtifact,
                format!("commit {short}: patch not captured: {e}"),
            ));
            String::new()
        }
    };
    write_if_changed(&dir.join("commit.patch"), patch.as_bytes())?;
    Ok(dir)
}
