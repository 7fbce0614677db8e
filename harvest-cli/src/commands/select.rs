//! `harvest select`: show which commits a transfer would pick, offline.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use harvest_sync::Workload;

use super::options::OptionArgs;

/// Arguments for `harvest select`.
#[derive(Args, Debug)]
pub struct SelectArgs {
    #[command(flatten)]
    pub common: OptionArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct AliasSelection {
    alias: String,
    markers: Vec<String>,
    commits: Vec<SelectedCommit>,
}

#[derive(Serialize)]
struct SelectedCommit {
    sha: String,
    markers: Vec<String>,
    message: String,
}

#[derive(Tabled)]
struct SelectRow {
    #[tabled(rename = "alias")]
    alias: String,
    #[tabled(rename = "sha")]
    sha: String,
    #[tabled(rename = "markers")]
    markers: String,
    #[tabled(rename = "message")]
    message: String,
}

impl SelectArgs {
    pub fn run(self) -> Result<()> {
        let options = self.common.load()?.resolve();
        let workload = Workload::load(&options).context("failed to load harvest inputs")?;

        let selections: Vec<AliasSelection> = workload
            .specs
            .iter()
            .map(|spec| {
                let selection = workload.selection_for(spec, options.max_commits);
                let commits = selection
                    .shas()
                    .iter()
                    .map(|sha| {
                        let record = selection.record(sha);
                        SelectedCommit {
                            sha: sha.clone(),
                            markers: record.map(|r| r.markers.clone()).unwrap_or_default(),
                            message: record.map(|r| r.message.clone()).unwrap_or_default(),
                        }
                    })
                    .collect();
                AliasSelection {
                    alias: spec.alias.to_string(),
                    markers: spec.commit_markers.clone(),
                    commits,
                }
            })
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&selections)?);
            return Ok(());
        }
        print_table(&selections);
        Ok(())
    }
}

fn print_table(selections: &[AliasSelection]) {
    let rows: Vec<SelectRow> = selections
        .iter()
        .flat_map(|sel| {
            sel.commits.iter().map(move |c| SelectRow {
                alias: sel.alias.clone(),
                sha: c.sha.chars().take(12).collect(),
                markers: c.markers.join(", "),
                message: c.message.lines().next().unwrap_or_default().to_string(),
            })
        })
        .collect();

    for sel in selections.iter().filter(|s| s.commits.is_empty()) {
        println!("{} {}: no commits selected", "·".bright_black(), sel.alias);
    }
    if rows.is_empty() {
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
