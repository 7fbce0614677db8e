//! Domain types for the harvest engine.
//!
//! Configuration-side types (`RepositorySpec`, `HarvestSpec`, `SyncRule`) are
//! immutable for the duration of a run. Result-side types (`SyncResult`,
//! `RepoOutcome`) are built during a run and only survive through the report.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Suffix a `changed_path_sync` rule matches when it declares no suffixes.
pub const DEFAULT_INCLUDE_SUFFIX: &str = ".patch";

/// Branch used when a registry row leaves `branch` blank.
pub const DEFAULT_BRANCH: &str = "main";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable short identifier for an upstream repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alias(pub String);

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Alias {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Alias {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Alias {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Registry + harvest map
// ---------------------------------------------------------------------------

/// One upstream repository in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    pub alias: Alias,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default = "default_true")]
    pub enabled_default: bool,
    #[serde(default)]
    pub focus_paths: Vec<String>,
    #[serde(default)]
    pub pinned_commits: Vec<String>,
    /// Explicit clone URL; defaults to the GitHub URL built from owner/repo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RepositorySpec {
    /// `owner/repo`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn remote_url(&self) -> String {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("https://github.com/{}/{}.git", self.owner, self.repo),
        }
    }

    /// Trim every field, default the branch, drop blank list entries and
    /// strip leading `/` from focus paths.
    pub(crate) fn normalized(mut self) -> Self {
        self.alias = Alias(self.alias.0.trim().to_string());
        self.owner = self.owner.trim().to_string();
        self.repo = self.repo.trim().to_string();
        self.branch = match self.branch.trim() {
            "" => DEFAULT_BRANCH.to_string(),
            b => b.to_string(),
        };
        self.focus_paths = clean_paths(&self.focus_paths);
        self.pinned_commits = clean_list(&self.pinned_commits);
        self
    }
}

/// Per-alias harvest configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSpec {
    pub alias: Alias,
    pub enabled: bool,
    pub harvest_paths: Vec<String>,
    pub commit_markers: Vec<String>,
    pub sync_rules: Vec<SyncRule>,
    /// Entries of the map that could not be turned into a [`SyncRule`].
    pub rule_errors: Vec<String>,
}

impl HarvestSpec {
    /// A spec with no rules, markers or paths.
    pub fn empty(alias: Alias) -> Self {
        Self {
            alias,
            enabled: true,
            harvest_paths: vec![],
            commit_markers: vec![],
            sync_rules: vec![],
            rule_errors: vec![],
        }
    }
}

// ---------------------------------------------------------------------------
// Sync rules
// ---------------------------------------------------------------------------

/// Symbolic or explicit revision a rule reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RefSelector {
    /// `head` or `branch`: the resolved branch's tracking ref.
    #[default]
    Head,
    /// `latest_commit`: newest selected commit, else the branch ref.
    LatestCommit,
    /// `commit:<sha>`.
    Commit(String),
    /// Anything else, used verbatim.
    Named(String),
}

impl RefSelector {
    /// A `commit:` prefix with no sha is rejected; git would read the index.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let selector = match raw.trim() {
            "" | "head" | "branch" => RefSelector::Head,
            "latest_commit" => RefSelector::LatestCommit,
            other => match other.strip_prefix("commit:").map(str::trim) {
                Some("") => return Err(format!("ref '{other}' names no commit")),
                Some(sha) => RefSelector::Commit(sha.to_string()),
                None => RefSelector::Named(other.to_string()),
            },
        };
        Ok(selector)
    }
}

impl fmt::Display for RefSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefSelector::Head => write!(f, "head"),
            RefSelector::LatestCommit => write!(f, "latest_commit"),
            RefSelector::Commit(sha) => write!(f, "commit:{sha}"),
            RefSelector::Named(name) => f.write_str(name),
        }
    }
}

/// Copy exactly one upstream file to one local target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCopyRule {
    pub source: String,
    pub target: String,
    pub reference: RefSelector,
    pub allow_missing: bool,
}

/// Mirror every file the selected commits touched under a source prefix.
///
/// Each file is read at the commit that touched it, so a `ref` on the map
/// entry is accepted and ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPathRule {
    pub source_prefix: String,
    pub target_prefix: String,
    pub include_suffixes: Vec<String>,
    pub exclude_substrings: Vec<String>,
}

impl ChangedPathRule {
    /// Suffixes a path must end with; defaults to [`DEFAULT_INCLUDE_SUFFIX`].
    pub fn suffixes(&self) -> Vec<&str> {
        if self.include_suffixes.is_empty() {
            vec![DEFAULT_INCLUDE_SUFFIX]
        } else {
            self.include_suffixes.iter().map(String::as_str).collect()
        }
    }

    /// Whether `path` is under the source prefix, has an included suffix, and
    /// contains none of the excluded substrings.
    pub fn matches(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix(self.source_prefix.as_str()) else {
            return false;
        };
        if !rest.starts_with('/') {
            return false;
        }
        if !self.suffixes().iter().any(|sfx| path.ends_with(sfx)) {
            return false;
        }
        !self
            .exclude_substrings
            .iter()
            .any(|token| path.contains(token.as_str()))
    }

    /// Strip the source prefix and re-root under the target prefix.
    pub fn retarget(&self, path: &str) -> Option<String> {
        let rel = path
            .strip_prefix(self.source_prefix.as_str())?
            .strip_prefix('/')?;
        Some(format!("{}/{}", self.target_prefix, rel))
    }
}

/// Closed set of declarative sync rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRule {
    PathCopy(PathCopyRule),
    ChangedPathSync(ChangedPathRule),
}

impl SyncRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            SyncRule::PathCopy(_) => RuleKind::PathCopy,
            SyncRule::ChangedPathSync(_) => RuleKind::ChangedPathSync,
        }
    }
}

/// Loosely-typed rule as it appears in the harvest map.
///
/// Every field is optional so a single bad entry never fails the whole file;
/// [`RawSyncRule::into_rule`] decides whether the entry is usable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSyncRule {
    pub kind: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub allow_missing: bool,
    pub source_prefix: String,
    pub target_prefix: String,
    pub include_suffixes: Vec<String>,
    pub exclude_substrings: Vec<String>,
}

impl RawSyncRule {
    pub fn into_rule(self) -> Result<SyncRule, String> {
        match self.kind.trim() {
            "path_copy" => {
                let source = clean_path(&self.source);
                let target = clean_path(&self.target);
                if source.is_empty() || target.is_empty() {
                    return Err("path_copy rule requires source and target".to_string());
                }
                let reference = RefSelector::parse(&self.reference)?;
                Ok(SyncRule::PathCopy(PathCopyRule {
                    source,
                    target,
                    reference,
                    allow_missing: self.allow_missing,
                }))
            }
            "changed_path_sync" => {
                let source_prefix = self.source_prefix.trim().trim_end_matches('/').to_string();
                let target_prefix = self.target_prefix.trim().trim_end_matches('/').to_string();
                if source_prefix.is_empty() || target_prefix.is_empty() {
                    return Err(
                        "changed_path_sync rule requires source_prefix and target_prefix"
                            .to_string(),
                    );
                }
                Ok(SyncRule::ChangedPathSync(ChangedPathRule {
                    source_prefix,
                    target_prefix,
                    include_suffixes: clean_list(&self.include_suffixes),
                    exclude_substrings: clean_list(&self.exclude_substrings),
                }))
            }
            "" => Err("sync rule is missing 'kind'".to_string()),
            other => Err(format!("unknown sync rule kind '{other}'")),
        }
    }
}

/// Discriminant of [`SyncRule`], as it appears in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    PathCopy,
    ChangedPathSync,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::PathCopy => "path_copy",
            RuleKind::ChangedPathSync => "changed_path_sync",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Commit feed
// ---------------------------------------------------------------------------

/// A candidate commit from the external scan feed (or a pinned commit).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitRecord {
    pub sha: String,
    pub sha_full: String,
    pub markers: Vec<String>,
    pub changed_paths: Vec<String>,
    pub message: String,
}

impl CommitRecord {
    /// Record for a pinned commit that the feed knows nothing about.
    pub fn pinned(sha: &str) -> Self {
        Self {
            sha_full: sha.to_string(),
            ..Self::default()
        }
    }

    /// Full sha when present, else the short one.
    pub fn full_sha(&self) -> &str {
        match self.sha_full.trim() {
            "" => self.sha.trim(),
            full => full,
        }
    }

    pub fn has_any_marker(&self, wanted: &[String]) -> bool {
        self.markers
            .iter()
            .map(|m| m.trim())
            .any(|m| !m.is_empty() && wanted.iter().any(|w| w == m))
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Terminal state of one materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Planned,
    Changed,
    Unchanged,
    Skipped,
    SkippedMissing,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Planned => "planned",
            SyncStatus::Changed => "changed",
            SyncStatus::Unchanged => "unchanged",
            SyncStatus::Skipped => "skipped",
            SyncStatus::SkippedMissing => "skipped_missing",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one (source, target) materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub kind: RuleKind,
    pub source: String,
    pub target: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Plan-mode unified diff against the current target. Never serialized.
    #[serde(skip)]
    pub diff: Option<String>,
}

impl SyncResult {
    pub fn new(kind: RuleKind, source: &str, target: &str, reference: &str) -> Self {
        Self {
            kind,
            source: source.to_string(),
            target: target.to_string(),
            reference: reference.to_string(),
            status: SyncStatus::Skipped,
            error: None,
            diff: None,
        }
    }

    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.status = status;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = SyncStatus::Error;
        self.error = Some(error.into());
        self
    }
}

/// Which non-fatal concern produced a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Malformed harvest-map entry. Counts as an alias error.
    Config,
    /// Best-effort pinned commit fetch failed.
    PinnedFetch,
    /// Sparse checkout could not be initialised or materialised.
    SparseCheckout,
    /// Commit artifact (meta / patch text) could not be produced.
    CommitArtifact,
}

/// Collected, never-aborting problem attached to an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Alias-level terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Processed,
    SkippedNoSyncRules,
    Error,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Processed => "processed",
            RepoStatus::SkippedNoSyncRules => "skipped_no_sync_rules",
            RepoStatus::Error => "error",
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one alias produced during a run.
///
/// Counters are never stored; they are derived from `sync_results`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoOutcome {
    pub alias: Alias,
    /// `owner/repo`, absent when the alias is unknown to the registry.
    pub repo: Option<String>,
    /// Branch requested by the registry.
    pub branch: Option<String>,
    /// Branch actually fetched.
    pub resolved_branch: Option<String>,
    pub head_sha: String,
    pub selected_commits: Vec<String>,
    pub sync_results: Vec<SyncResult>,
    pub diagnostics: Vec<Diagnostic>,
    pub auto_focus_sync: bool,
    pub status: RepoStatus,
    pub error: Option<String>,
}

impl RepoOutcome {
    fn base(alias: Alias, repo: Option<&RepositorySpec>, status: RepoStatus) -> Self {
        Self {
            alias,
            repo: repo.map(RepositorySpec::slug),
            branch: repo.map(|r| r.branch.clone()),
            resolved_branch: None,
            head_sha: String::new(),
            selected_commits: vec![],
            sync_results: vec![],
            diagnostics: vec![],
            auto_focus_sync: false,
            status,
            error: None,
        }
    }

    /// The harvest map references an alias the registry does not define.
    pub fn unknown_alias(alias: Alias) -> Self {
        let mut outcome = Self::base(alias, None, RepoStatus::Error);
        outcome.error = Some("alias not found in repository registry".to_string());
        outcome
    }

    /// No sync rules (even after auto-derivation) and skip-if-empty is on.
    pub fn skipped_no_rules(repo: &RepositorySpec) -> Self {
        Self::base(repo.alias.clone(), Some(repo), RepoStatus::SkippedNoSyncRules)
    }

    /// A fatal error aborted the alias.
    pub fn failed(repo: &RepositorySpec, error: impl Into<String>) -> Self {
        let mut outcome = Self::base(repo.alias.clone(), Some(repo), RepoStatus::Error);
        outcome.error = Some(error.into());
        outcome
    }

    /// A started alias with nothing recorded yet.
    pub fn processed(repo: &RepositorySpec) -> Self {
        Self::base(repo.alias.clone(), Some(repo), RepoStatus::Processed)
    }

    pub fn count(&self, status: SyncStatus) -> usize {
        self.sync_results.iter().filter(|r| r.status == status).count()
    }

    pub fn sync_changed(&self) -> usize {
        self.count(SyncStatus::Changed)
    }

    pub fn sync_unchanged(&self) -> usize {
        self.count(SyncStatus::Unchanged)
    }

    pub fn sync_errors(&self) -> usize {
        self.count(SyncStatus::Error)
    }

    pub fn config_errors(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Config)
            .count()
    }

    /// Whether this alias contributes to the run's error total.
    pub fn is_error(&self) -> bool {
        self.status == RepoStatus::Error || self.sync_errors() > 0 || self.config_errors() > 0
    }

    /// The fetched branch differs from the one the registry asked for.
    pub fn branch_drifted(&self) -> bool {
        match (&self.branch, &self.resolved_branch) {
            (Some(requested), Some(resolved)) => requested != resolved,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Trim, strip leading `/`.
pub(crate) fn clean_path(raw: &str) -> String {
    raw.trim().trim_start_matches('/').to_string()
}

pub(crate) fn clean_paths(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|p| clean_path(p))
        .filter(|p| !p.is_empty())
        .collect()
}

pub(crate) fn clean_list(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
