//! # harvest-sync
//!
//! Mirroring, rule evaluation and content-gated writes.
//!
//! Call [`pipeline::run`] to process every selected alias; each one ends up as
//! a [`harvest_core::RepoOutcome`] no matter what failed along the way.

pub mod artifacts;
pub mod canon;
pub mod engine;
pub mod error;
pub mod git;
pub mod mirror;
pub mod pipeline;
pub mod source;
pub mod writer;

pub use canon::Canonicalizer;
pub use engine::{apply_rules, resolve_ref, SyncContext};
pub use error::HarvestError;
pub use mirror::{BranchResolution, LocalMirror, MirrorManager};
pub use pipeline::{run, Workload};
pub use source::BlobSource;
pub use writer::WriteOutcome;
