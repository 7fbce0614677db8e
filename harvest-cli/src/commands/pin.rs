//! `harvest pin-branches`: persist branch drift found by a transfer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use harvest_core::registry::pin_branches_at;
use harvest_report::{load_resolved_branches, output::JSON_REPORT};

use super::options::OptionArgs;

/// Arguments for `harvest pin-branches`.
#[derive(Args, Debug)]
pub struct PinArgs {
    #[command(flatten)]
    pub common: OptionArgs,

    /// Transfer report to read; defaults to the one in the output directory.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the changes without rewriting the registry.
    #[arg(long)]
    pub dry_run: bool,
}

impl PinArgs {
    pub fn run(self) -> Result<()> {
        let options = self.common.load()?.resolve();
        let report = self
            .report
            .clone()
            .unwrap_or_else(|| options.out_dir.join(JSON_REPORT));

        let resolved = load_resolved_branches(&report)
            .with_context(|| format!("failed to read transfer report {}", report.display()))?;
        let changes = pin_branches_at(&options.registry_file, &resolved, !self.dry_run)
            .with_context(|| {
                format!("failed to update registry {}", options.registry_file.display())
            })?;

        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        if changes.is_empty() {
            println!("{prefix}✓ registry branches already match {}", report.display());
            return Ok(());
        }
        for change in &changes {
            println!(
                "{prefix}{}: {} → {}",
                change.alias,
                change.previous.as_deref().unwrap_or("(none)").bright_black(),
                change.resolved.green(),
            );
        }
        let verb = if self.dry_run { "would update" } else { "updated" };
        println!(
            "{prefix}{verb} {} entr{} in {}",
            changes.len(),
            if changes.len() == 1 { "y" } else { "ies" },
            options.registry_file.display()
        );
        Ok(())
    }
}
