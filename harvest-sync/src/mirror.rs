//! Local Mirror Manager: one minimal clone per alias.
//!
//! # Layout
//!
//! ```text
//! <mirror_dir>/
//!   <alias>/     blob-less, checkout-less clone; remote `origin`
//! ```
//!
//! # Per-alias sequence
//!
//! 1. [`MirrorManager::ensure`]: clone on first use, else repair `origin`.
//! 2. [`LocalMirror::resolve_branch`]: configured → remote HEAD → `main` → `master`.
//! 3. [`LocalMirror::fetch_branch`]: depth-limited, blob-filtered, tag-less.
//! 4. [`LocalMirror::fetch_pinned`]: best-effort depth-1 fetch per pinned sha.
//! 5. [`LocalMirror::configure_sparse`]: non-cone sparse checkout of harvest paths.
//! 6. [`LocalMirror::head_sha`]: final ref resolution.
//!
//! Steps 1, 2, 3 and 6 are fatal for the alias. Steps 4 and 5 only add
//! diagnostics.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use harvest_core::{Alias, Diagnostic, DiagnosticKind, RepositorySpec};

use crate::error::{io_err, HarvestError};
use crate::git::GitRunner;
use crate::source::BlobSource;

static SYMREF_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^ref:\s+refs/heads/(\S+)\s+HEAD\s*$").expect("valid symref regex")
});

/// Branches probed after the configured branch and the remote HEAD.
const FALLBACK_BRANCHES: &[&str] = &["main", "master"];

/// `refs/remotes/origin/<branch>`.
pub fn tracking_ref(branch: &str) -> String {
    format!("refs/remotes/origin/{branch}")
}

/// Extract the branch the remote's symbolic HEAD points at from
/// `git ls-remote --symref origin HEAD` output.
pub fn parse_symref_head(ls_remote: &str) -> Option<String> {
    SYMREF_HEAD
        .captures(ls_remote)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// How the effective branch was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSource {
    Configured,
    RemoteHead,
    Fallback,
}

/// Effective and originally requested branch, so drift is observable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchResolution {
    pub requested: String,
    pub resolved: String,
    pub source: BranchSource,
}

impl BranchResolution {
    pub fn drifted(&self) -> bool {
        self.requested != self.resolved
    }
}

/// Owns the mirror directory and hands out per-alias [`LocalMirror`]s.
#[derive(Debug, Clone)]
pub struct MirrorManager {
    root: PathBuf,
    git: GitRunner,
    fetch_git: GitRunner,
}

impl MirrorManager {
    pub fn new(root: impl Into<PathBuf>, command_timeout: Duration, fetch_timeout: Duration) -> Self {
        let git = GitRunner::new(command_timeout);
        let fetch_git = git.with_timeout(fetch_timeout);
        Self {
            root: root.into(),
            git,
            fetch_git,
        }
    }

    pub fn mirror_dir(&self, alias: &Alias) -> PathBuf {
        self.root.join(alias.as_str())
    }

    /// Clone on first use; otherwise make sure `origin` points at the
    /// registry URL.
    pub fn ensure(&self, repo: &RepositorySpec) -> Result<LocalMirror, HarvestError> {
        check_mirrorable(repo)?;
        let dir = self.mirror_dir(&repo.alias);
        let url = repo.remote_url();

        if !dir.join(".git").exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
            let dir_str = dir.to_string_lossy().into_owned();
            tracing::info!("{}: cloning {url}", repo.alias);
            self.fetch_git.bytes(
                None,
                &["clone", "--filter=blob:none", "--no-checkout", "--quiet", &url, &dir_str],
            )?;
        } else {
            let current = self
                .git
                .probe(Some(&dir), &["remote", "get-url", "origin"])?;
            let current_url = current.stdout_text().trim().to_string();
            if !current.success || current_url.is_empty() {
                tracing::info!("{}: adding missing origin", repo.alias);
                self.git
                    .bytes(Some(&dir), &["remote", "add", "origin", &url])?;
            } else if current_url != url {
                tracing::info!("{}: repointing origin {current_url} -> {url}", repo.alias);
                self.git
                    .bytes(Some(&dir), &["remote", "set-url", "origin", &url])?;
            }
        }

        Ok(LocalMirror {
            alias: repo.alias.clone(),
            dir,
            git: self.git.clone(),
            fetch_git: self.fetch_git.clone(),
        })
    }
}

/// The alias names a directory under the mirror root and the row must yield a
/// clone URL.
fn check_mirrorable(repo: &RepositorySpec) -> Result<(), HarvestError> {
    let alias = repo.alias.as_str();
    let reason = if alias.is_empty() || alias == "." || alias == ".." || alias.contains(['/', '\\']) {
        Some("alias is not usable as a mirror directory name")
    } else if repo.url.as_deref().map_or(true, |u| u.trim().is_empty())
        && (repo.owner.is_empty() || repo.repo.is_empty())
    {
        Some("registry entry has neither url nor owner/repo")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(HarvestError::Configuration {
            alias: alias.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// A single alias's clone. No state is shared between mirrors.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    alias: Alias,
    dir: PathBuf,
    git: GitRunner,
    fetch_git: GitRunner,
}

impl LocalMirror {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    fn remote_has_branch(&self, branch: &str) -> Result<bool, HarvestError> {
        let pattern = format!("refs/heads/{branch}");
        let out = self
            .fetch_git
            .probe(Some(&self.dir), &["ls-remote", "--heads", "origin", &pattern])?;
        Ok(out.success && !out.stdout_text().trim().is_empty())
    }

    fn remote_head(&self) -> Result<Option<String>, HarvestError> {
        let out = self
            .fetch_git
            .probe(Some(&self.dir), &["ls-remote", "--symref", "origin", "HEAD"])?;
        if !out.success {
            return Ok(None);
        }
        Ok(parse_symref_head(&out.stdout_text()))
    }

    /// Configured branch → remote symbolic HEAD → `main` → `master`.
    pub fn resolve_branch(&self, preferred: &str) -> Result<BranchResolution, HarvestError> {
        let requested = match preferred.trim() {
            "" => harvest_core::types::DEFAULT_BRANCH.to_string(),
            b => b.to_string(),
        };
        let found = |resolved: String, source| BranchResolution {
            requested: requested.clone(),
            resolved,
            source,
        };

        if self.remote_has_branch(&requested)? {
            return Ok(found(requested.clone(), BranchSource::Configured));
        }
        if let Some(head) = self.remote_head()? {
            tracing::info!("{}: branch '{requested}' missing; remote HEAD is '{head}'", self.alias);
            return Ok(found(head, BranchSource::RemoteHead));
        }
        for fallback in FALLBACK_BRANCHES {
            if *fallback == requested {
                continue;
            }
            if self.remote_has_branch(fallback)? {
                tracing::info!("{}: branch '{requested}' missing; using '{fallback}'", self.alias);
                return Ok(found(fallback.to_string(), BranchSource::Fallback));
            }
        }

        let mut tried = vec![requested.clone(), "HEAD".to_string()];
        tried.extend(
            FALLBACK_BRANCHES
                .iter()
                .filter(|b| **b != requested)
                .map(|b| b.to_string()),
        );
        Err(HarvestError::RemoteResolution {
            alias: self.alias.0.clone(),
            tried: tried.join(", "),
        })
    }

    /// Depth-limited, blob-filtered, tag-less fetch of the branch's tracking ref.
    pub fn fetch_branch(&self, branch: &str, depth: u32) -> Result<(), HarvestError> {
        let refspec = format!("+refs/heads/{branch}:{}", tracking_ref(branch));
        let depth = depth.max(1).to_string();
        self.fetch_git
            .bytes(
                Some(&self.dir),
                &[
                    "fetch",
                    "--depth",
                    &depth,
                    "--filter=blob:none",
                    "--no-tags",
                    "--quiet",
                    "origin",
                    &refspec,
                ],
            )
            .map(|_| ())
            .map_err(|e| match e {
                HarvestError::Git { stderr, .. } => HarvestError::Fetch {
                    refspec: refspec.clone(),
                    reason: stderr,
                },
                other => other,
            })
    }

    pub fn commit_exists(&self, sha: &str) -> bool {
        let spec = format!("{sha}^{{commit}}");
        self.git
            .probe(Some(&self.dir), &["cat-file", "-e", &spec])
            .map(|out| out.success)
            .unwrap_or(false)
    }

    /// Best-effort depth-1 fetch of each pinned sha not already present.
    /// Failures are swallowed into `diagnostics` one by one.
    pub fn fetch_pinned(&self, shas: &[String], diagnostics: &mut Vec<Diagnostic>) {
        for sha in shas.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if self.commit_exists(sha) {
                continue;
            }
            let result = self.fetch_git.probe(
                Some(&self.dir),
                &[
                    "fetch",
                    "--depth",
                    "1",
                    "--filter=blob:none",
                    "--no-tags",
                    "--quiet",
                    "origin",
                    sha,
                ],
            );
            let reason = match result {
                Ok(out) if out.success => continue,
                Ok(out) => out.stderr,
                Err(e) => e.to_string(),
            };
            tracing::warn!("{}: pinned commit {sha} not fetched: {reason}", self.alias);
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::PinnedFetch,
                format!("pinned commit {sha} not fetched: {reason}"),
            ));
        }
    }

    /// Restrict the working tree to exactly `paths` (non-cone) and materialize
    /// it at `branch`. No-op when `paths` is empty. Returns whether a sparse
    /// checkout was configured.
    pub fn configure_sparse(
        &self,
        paths: &[String],
        branch: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> bool {
        let normalized: Vec<&str> = paths
            .iter()
            .map(|p| p.trim().trim_start_matches('/'))
            .filter(|p| !p.is_empty())
            .collect();
        if normalized.is_empty() {
            return false;
        }

        let mut note = |step: &str, reason: String| {
            tracing::warn!("{}: sparse checkout {step} failed: {reason}", self.alias);
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::SparseCheckout,
                format!("sparse checkout {step} failed: {reason}"),
            ));
        };

        match self
            .git
            .probe(Some(&self.dir), &["sparse-checkout", "init", "--no-cone"])
        {
            Ok(out) if out.success => {}
            Ok(out) => note("init", out.stderr),
            Err(e) => note("init", e.to_string()),
        }

        let mut set_args = vec!["sparse-checkout", "set", "--no-cone"];
        set_args.extend(normalized.iter().copied());
        if let Err(e) = self.git.bytes(Some(&self.dir), &set_args) {
            note("set", e.to_string());
            return false;
        }

        let target = tracking_ref(branch);
        if let Err(e) = self
            .fetch_git
            .bytes(Some(&self.dir), &["checkout", "-f", "--quiet", "--detach", &target])
        {
            note("checkout", e.to_string());
        }
        true
    }

    /// Sha the branch's tracking ref points at.
    pub fn head_sha(&self, branch: &str) -> Result<String, HarvestError> {
        let spec = format!("{}^{{commit}}", tracking_ref(branch));
        let out = self
            .git
            .text(Some(&self.dir), &["rev-parse", "--verify", &spec])?;
        Ok(out.trim().to_string())
    }
}

impl BlobSource for LocalMirror {
    fn read_blob(&self, rev: &str, path: &str) -> Result<Vec<u8>, HarvestError> {
        let spec = format!("{rev}:{path}");
        self.fetch_git
            .bytes(Some(&self.dir), &["show", &spec])
            .map_err(|e| HarvestError::BlobRead {
                rev: rev.to_string(),
                path: path.to_string(),
                reason: match e {
                    HarvestError::Git { stderr, .. } => stderr,
                    other => other.to_string(),
                },
            })
    }

    fn changed_paths(&self, sha: &str) -> Result<Vec<String>, HarvestError> {
        let out = self.fetch_git.text(
            Some(&self.dir),
            &["show", "--name-only", "--no-renames", "--pretty=format:", sha],
        )?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// `git show --patch` text for `sha`, limited to `paths` when given, or
    /// the `--stat` form when not.
    fn commit_patch(&self, sha: &str, paths: &[String]) -> Result<String, HarvestError> {
        let mut args = vec!["show", "--no-color", "--patch"];
        if paths.is_empty() {
            args.push("--stat");
            args.push(sha);
        } else {
            args.push(sha);
            args.push("--");
            args.extend(paths.iter().map(String::as_str));
        }
        self.fetch_git.text(Some(&self.dir), &args)
    }
}
