//! Harvest: upstream patch harvesting CLI.
//!
//! # Usage
//!
//! ```text
//! harvest transfer [--config <file>] [--aliases a,b] [--plan] [--show-diff] [--fail-on-errors]
//! harvest select [--aliases a,b] [--json]
//! harvest pin-branches [--report <file>] [--dry-run]
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{pin::PinArgs, select::SelectArgs, transfer::TransferArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "harvest",
    version,
    about = "Harvest upstream patches into a local tree",
    long_about = None,
)]
struct Cli {
    /// Raise log verbosity to debug (RUST_LOG still wins when set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror, select, sync and report every selected alias.
    Transfer(TransferArgs),

    /// Preview commit selection from the feed without touching the network.
    Select(SelectArgs),

    /// Write resolved branches from a transfer report back into the registry.
    PinBranches(PinArgs),
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Transfer(args) => args.run(),
        Commands::Select(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::PinBranches(args) => args.run().map(|()| ExitCode::SUCCESS),
    }
}
