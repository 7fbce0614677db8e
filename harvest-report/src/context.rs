//! Report payload: serializable view of a run built from [`RepoOutcome`]s.
//!
//! Counters are computed here, at build time, from each alias's sync results;
//! they are never carried around separately.

use serde::{Deserialize, Serialize};

use harvest_core::{Diagnostic, RepoOutcome, RepoStatus, RunOptions, SyncResult};

use crate::error::ReportError;

/// Whole-run payload written as `transfer-report.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    pub apply_changes: bool,
    pub skip_no_sync: bool,
    pub auto_focus_sync: bool,
    pub include_unmapped: bool,
    /// Aliases that failed, have a rule error, or carry configuration
    /// diagnostics.
    pub repo_errors: usize,
    pub repos: Vec<RepoReport>,
}

/// One alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoReport {
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_branch: Option<String>,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub selected_commits: Vec<String>,
    #[serde(default)]
    pub sync_changed: usize,
    #[serde(default)]
    pub sync_unchanged: usize,
    #[serde(default)]
    pub sync_errors: usize,
    #[serde(default)]
    pub sync_results: Vec<SyncResult>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub auto_focus_sync: bool,
    pub status: RepoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RepoOutcome> for RepoReport {
    fn from(outcome: &RepoOutcome) -> Self {
        Self {
            alias: outcome.alias.0.clone(),
            repo: outcome.repo.clone(),
            branch: outcome.branch.clone(),
            resolved_branch: outcome.resolved_branch.clone(),
            head_sha: outcome.head_sha.clone(),
            selected_commits: outcome.selected_commits.clone(),
            sync_changed: outcome.sync_changed(),
            sync_unchanged: outcome.sync_unchanged(),
            sync_errors: outcome.sync_errors(),
            sync_results: outcome.sync_results.clone(),
            diagnostics: outcome.diagnostics.clone(),
            auto_focus_sync: outcome.auto_focus_sync,
            status: outcome.status,
            error: outcome.error.clone(),
        }
    }
}

impl TransferReport {
    pub fn build(options: &RunOptions, outcomes: &[RepoOutcome]) -> Self {
        Self {
            apply_changes: options.apply,
            skip_no_sync: options.skip_no_sync,
            auto_focus_sync: options.auto_focus_sync,
            include_unmapped: options.include_unmapped,
            repo_errors: outcomes.iter().filter(|o| o.is_error()).count(),
            repos: outcomes.iter().map(RepoReport::from).collect(),
        }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String, ReportError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Convert into a Tera context.
    pub fn to_tera_context(&self) -> Result<tera::Context, ReportError> {
        let mut ctx = tera::Context::new();
        ctx.insert("report", &serde_json::to_value(self)?);
        Ok(ctx)
    }
}
