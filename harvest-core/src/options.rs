//! Run parameters for one harvest transfer.
//!
//! Every field has a default so a `--config` file only needs to name what it
//! changes. Relative paths are resolved against `repo_root` by
//! [`RunOptions::resolve`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document::read_document;
use crate::error::ConfigError;
use crate::harvest_map::{AliasFilter, DEFAULT_SNAPSHOT_ROOT};

/// Default patch-set root whose `.patch` targets are canonicalized.
pub const DEFAULT_PATCH_ROOT: &str = "ci/gamenative/patchsets/28c3a06/android/patches";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Sandbox root: every real write must land inside it.
    pub repo_root: PathBuf,
    pub registry_file: PathBuf,
    pub map_file: PathBuf,
    pub commit_scan_file: PathBuf,
    /// One local mirror per alias lives under this directory.
    pub mirror_dir: PathBuf,
    /// Shadow mirrors, commit artifacts and reports.
    pub out_dir: PathBuf,
    /// Comma-separated alias allow-list; empty means all.
    pub aliases: String,
    /// Include specs with `enabled: false`.
    pub all_repos: bool,
    /// Write real targets; otherwise only plan.
    pub apply: bool,
    pub skip_no_sync: bool,
    pub auto_focus_sync: bool,
    pub include_unmapped: bool,
    pub fail_on_errors: bool,
    pub max_commits: usize,
    pub fetch_depth: u32,
    pub command_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub snapshot_root: String,
    pub patch_root: String,
    /// Attach unified diffs to planned results.
    pub show_diff: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            registry_file: PathBuf::from("ci/reverse/online_intake_repos.json"),
            map_file: PathBuf::from("ci/reverse/transfer_map.json"),
            commit_scan_file: PathBuf::from("docs/reverse/online-intake/commit-scan.json"),
            mirror_dir: PathBuf::from(".harvest/mirrors"),
            out_dir: PathBuf::from("docs/reverse/online-intake/harvest"),
            aliases: String::new(),
            all_repos: false,
            apply: true,
            skip_no_sync: true,
            auto_focus_sync: true,
            include_unmapped: true,
            fail_on_errors: false,
            max_commits: 24,
            fetch_depth: 120,
            command_timeout_secs: 120,
            fetch_timeout_secs: 420,
            snapshot_root: DEFAULT_SNAPSHOT_ROOT.to_string(),
            patch_root: DEFAULT_PATCH_ROOT.to_string(),
            show_diff: false,
        }
    }
}

impl RunOptions {
    /// Load defaults from a YAML or JSON config file.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let doc = read_document(path)?;
        serde_json::from_value(doc).map_err(|e| ConfigError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Anchor relative paths at `repo_root` and clamp numeric knobs.
    pub fn resolve(mut self) -> Self {
        let root = self.repo_root.clone();
        for path in [
            &mut self.registry_file,
            &mut self.map_file,
            &mut self.commit_scan_file,
            &mut self.mirror_dir,
            &mut self.out_dir,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self.max_commits = self.max_commits.max(1);
        self.fetch_depth = self.fetch_depth.max(1);
        self.command_timeout_secs = self.command_timeout_secs.max(1);
        self.fetch_timeout_secs = self.fetch_timeout_secs.max(1);
        self
    }

    pub fn alias_filter(&self) -> AliasFilter {
        AliasFilter::parse_csv(&self.aliases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_config_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("harvest.yaml");
        std::fs::write(&path, "apply: false\nmax_commits: 3\n").unwrap();
        let opts = RunOptions::load_at(&path).unwrap();
        assert!(!opts.apply);
        assert_eq!(opts.max_commits, 3);
        assert_eq!(opts.fetch_depth, 120);
        assert!(opts.skip_no_sync);
    }

    #[test]
    fn resolve_anchors_relative_paths_and_clamps() {
        let opts = RunOptions {
            repo_root: PathBuf::from("/work/repo"),
            mirror_dir: PathBuf::from("/abs/mirrors"),
            max_commits: 0,
            fetch_depth: 0,
            ..RunOptions::default()
        }
        .resolve();
        assert_eq!(
            opts.registry_file,
            PathBuf::from("/work/repo/ci/reverse/online_intake_repos.json")
        );
        assert_eq!(opts.mirror_dir, PathBuf::from("/abs/mirrors"));
        assert_eq!(opts.max_commits, 1);
        assert_eq!(opts.fetch_depth, 1);
    }
}
