//! Flags shared by every subcommand that reads the run configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use harvest_core::RunOptions;

/// `--config` plus per-field overrides; a flag always beats the file.
#[derive(Args, Debug, Default)]
pub struct OptionArgs {
    /// YAML or JSON file supplying run defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Sandbox root; every relative path is resolved against it.
    #[arg(long)]
    pub repo_root: Option<PathBuf>,

    #[arg(long)]
    pub registry: Option<PathBuf>,

    #[arg(long)]
    pub map: Option<PathBuf>,

    /// Commit-scan feed (optional file).
    #[arg(long)]
    pub commit_scan: Option<PathBuf>,

    #[arg(long)]
    pub mirror_dir: Option<PathBuf>,

    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Comma-separated alias allow-list.
    #[arg(long)]
    pub aliases: Option<String>,

    /// Include specs marked `enabled: false`.
    #[arg(long)]
    pub all_repos: bool,

    /// Do not add registry aliases missing from the harvest map.
    #[arg(long)]
    pub no_include_unmapped: bool,

    #[arg(long)]
    pub max_commits: Option<usize>,
}

impl OptionArgs {
    /// Config file (if any), then flags, then path anchoring.
    pub fn load(&self) -> Result<RunOptions> {
        let mut options = match &self.config {
            Some(path) => RunOptions::load_at(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RunOptions::default(),
        };

        if let Some(root) = &self.repo_root {
            options.repo_root = root.clone();
        }
        if let Some(path) = &self.registry {
            options.registry_file = path.clone();
        }
        if let Some(path) = &self.map {
            options.map_file = path.clone();
        }
        if let Some(path) = &self.commit_scan {
            options.commit_scan_file = path.clone();
        }
        if let Some(path) = &self.mirror_dir {
            options.mirror_dir = path.clone();
        }
        if let Some(path) = &self.out_dir {
            options.out_dir = path.clone();
        }
        if let Some(aliases) = &self.aliases {
            options.aliases = aliases.clone();
        }
        if let Some(max) = self.max_commits {
            options.max_commits = max;
        }
        options.all_repos |= self.all_repos;
        if self.no_include_unmapped {
            options.include_unmapped = false;
        }
        Ok(options)
    }
}
