//! Read-only view of an upstream repository.

use crate::error::HarvestError;

/// Revision-addressed file access without a working-tree checkout.
///
/// [`crate::mirror::LocalMirror`] implements this over git plumbing; tests use
/// an in-memory map.
pub trait BlobSource {
    /// Content of `path` at `rev`. A missing path or revision is
    /// [`HarvestError::BlobRead`].
    fn read_blob(&self, rev: &str, path: &str) -> Result<Vec<u8>, HarvestError>;

    /// Paths touched by commit `sha`.
    fn changed_paths(&self, sha: &str) -> Result<Vec<String>, HarvestError>;

    /// Patch text of commit `sha`, limited to `paths` when non-empty.
    fn commit_patch(&self, sha: &str, paths: &[String]) -> Result<String, HarvestError>;
}
