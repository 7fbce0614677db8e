//! # harvest-report
//!
//! Transfer Reporter: aggregates per-alias outcomes into a JSON payload and a
//! Tera-rendered Markdown summary.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use harvest_core::RunOptions;
//! use harvest_report::{write_reports, TransferReport};
//!
//! fn report(options: &RunOptions, outcomes: &[harvest_core::RepoOutcome]) {
//!     let report = TransferReport::build(options, outcomes);
//!     if let Ok(paths) = write_reports(&options.out_dir, &report) {
//!         println!("{}", paths.json.display());
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod output;

pub use context::{RepoReport, TransferReport};
pub use engine::ReportRenderer;
pub use error::ReportError;
pub use output::{load_resolved_branches, write_reports, ReportPaths};
