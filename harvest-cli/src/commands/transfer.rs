//! `harvest transfer`: the batch run.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use harvest_core::{RepoOutcome, RepoStatus, RunOptions};
use harvest_report::{write_reports, ReportPaths, TransferReport};

use super::options::OptionArgs;

/// Arguments for `harvest transfer`.
#[derive(Args, Debug)]
pub struct TransferArgs {
    #[command(flatten)]
    pub common: OptionArgs,

    /// Plan only: shadow mirrors and reports are written, real targets are not.
    #[arg(long, conflicts_with = "apply")]
    pub plan: bool,

    /// Write real targets even if the config file says otherwise.
    #[arg(long)]
    pub apply: bool,

    /// Print a unified diff for every planned write.
    #[arg(long)]
    pub show_diff: bool,

    /// Process specs that have no sync rules instead of skipping them.
    #[arg(long)]
    pub no_skip_no_sync: bool,

    /// Never derive sync rules from registry focus paths.
    #[arg(long)]
    pub no_auto_focus_sync: bool,

    /// Exit with status 1 when any alias reports an error.
    #[arg(long)]
    pub fail_on_errors: bool,

    #[arg(long)]
    pub fetch_depth: Option<u32>,

    /// Timeout for local git commands, in seconds.
    #[arg(long)]
    pub command_timeout: Option<u64>,

    /// Timeout for network fetches, in seconds.
    #[arg(long)]
    pub fetch_timeout: Option<u64>,
}

impl TransferArgs {
    pub fn run(self) -> Result<ExitCode> {
        let options = self.options()?;
        let outcomes = harvest_sync::run(&options).context("transfer aborted")?;

        let report = TransferReport::build(&options, &outcomes);
        let paths = write_reports(&options.out_dir, &report).with_context(|| {
            format!("failed to write reports to {}", options.out_dir.display())
        })?;

        if options.show_diff && !options.apply {
            print_diffs(&outcomes);
        }
        print_summary(&outcomes, &report, &paths, options.apply);

        if options.fail_on_errors && report.repo_errors > 0 {
            return Ok(ExitCode::FAILURE);
        }
        Ok(ExitCode::SUCCESS)
    }

    fn options(&self) -> Result<RunOptions> {
        let mut options = self.common.load()?;
        if self.plan {
            options.apply = false;
        }
        if self.apply {
            options.apply = true;
        }
        options.show_diff |= self.show_diff;
        options.fail_on_errors |= self.fail_on_errors;
        if self.no_skip_no_sync {
            options.skip_no_sync = false;
        }
        if self.no_auto_focus_sync {
            options.auto_focus_sync = false;
        }
        if let Some(depth) = self.fetch_depth {
            options.fetch_depth = depth;
        }
        if let Some(secs) = self.command_timeout {
            options.command_timeout_secs = secs;
        }
        if let Some(secs) = self.fetch_timeout {
            options.fetch_timeout_secs = secs;
        }
        Ok(options.resolve())
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "alias")]
    alias: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "commits")]
    commits: usize,
    #[tabled(rename = "changed")]
    changed: usize,
    #[tabled(rename = "unchanged")]
    unchanged: usize,
    #[tabled(rename = "errors")]
    errors: usize,
    #[tabled(rename = "diagnostics")]
    diagnostics: usize,
}

impl From<&RepoOutcome> for SummaryRow {
    fn from(outcome: &RepoOutcome) -> Self {
        Self {
            alias: outcome.alias.to_string(),
            branch: branch_label(outcome),
            status: status_label(outcome),
            commits: outcome.selected_commits.len(),
            changed: outcome.sync_changed(),
            unchanged: outcome.sync_unchanged(),
            errors: outcome.sync_errors(),
            diagnostics: outcome.diagnostics.len(),
        }
    }
}

fn branch_label(outcome: &RepoOutcome) -> String {
    let requested = outcome.branch.as_deref().unwrap_or("-");
    match outcome.resolved_branch.as_deref() {
        Some(resolved) if outcome.branch_drifted() => {
            format!("{requested} → {}", resolved.yellow())
        }
        _ => requested.to_string(),
    }
}

fn status_label(outcome: &RepoOutcome) -> String {
    let label = outcome.status.as_str();
    match outcome.status {
        RepoStatus::Error => label.red().to_string(),
        RepoStatus::SkippedNoSyncRules => label.bright_black().to_string(),
        RepoStatus::Processed if outcome.is_error() => label.yellow().to_string(),
        RepoStatus::Processed => label.green().to_string(),
    }
}

fn print_summary(
    outcomes: &[RepoOutcome],
    report: &TransferReport,
    paths: &ReportPaths,
    apply: bool,
) {
    let mode = if apply { "apply" } else { "plan" };
    println!(
        "Harvest v{} | {} aliases | {} with errors | mode: {}",
        env!("CARGO_PKG_VERSION"),
        outcomes.len(),
        report.repo_errors,
        mode.bold(),
    );

    let mut table = Table::new(outcomes.iter().map(SummaryRow::from));
    table.with(Style::rounded());
    println!("{table}");

    for outcome in outcomes {
        if let Some(error) = &outcome.error {
            println!("{} {}: {error}", "✗".red(), outcome.alias);
        }
    }

    println!("JSON report:     {}", paths.json.display());
    println!("Markdown report: {}", paths.markdown.display());
}

fn print_diffs(outcomes: &[RepoOutcome]) {
    for result in outcomes.iter().flat_map(|o| &o.sync_results) {
        let Some(diff) = &result.diff else {
            continue;
        };
        print!("{diff}");
        if !diff.ends_with('\n') {
            println!();
        }
    }
}
