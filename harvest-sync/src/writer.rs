//! Content-gated atomic writer and path containment.
//!
//! ## `write_if_changed`: protocol
//!
//! 1. Read the current target, if any.
//! 2. Byte-compare with the new content → skip if identical (mtime untouched).
//! 3. Write to `<path>.harvest.tmp`.
//! 4. Rename to the final path (atomic on POSIX).
//!
//! Targets are resolved through [`contained_path`] first; a target that
//! normalizes outside its root is [`HarvestError::PathEscape`] and nothing is
//! written.

use std::path::{Component, Path, PathBuf};

use similar::TextDiff;

use crate::error::{io_err, HarvestError};

/// Outcome of an individual file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Content differed or the file did not exist.
    Written,
    /// Existing content was byte-identical; the file was not touched.
    Unchanged,
}

/// Write `data` to `path` only if it differs from what is there.
pub fn write_if_changed(path: &Path, data: &[u8]) -> Result<WriteOutcome, HarvestError> {
    let tmp = PathBuf::from(format!("{}.harvest.tmp", path.display()));
    write_if_changed_with_tmp(path, data, &tmp)
}

fn write_if_changed_with_tmp(
    path: &Path,
    data: &[u8],
    tmp: &Path,
) -> Result<WriteOutcome, HarvestError> {
    if let Ok(current) = std::fs::read(path) {
        if current == data {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteOutcome::Unchanged);
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, data).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!("wrote: {}", path.display());
    Ok(WriteOutcome::Written)
}

/// Join `relative` onto `root`, refusing anything that leaves `root`.
///
/// The check is lexical first (`..`, absolute paths, an empty result) and then
/// physical: the deepest existing ancestor of the result must canonicalize to
/// somewhere under the canonical root, so a symlink cannot smuggle a write out.
pub fn contained_path(root: &Path, relative: &str) -> Result<PathBuf, HarvestError> {
    let escape = || HarvestError::PathEscape {
        target: relative.to_string(),
    };

    let mut rel = PathBuf::new();
    for component in Path::new(relative.trim()).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !rel.pop() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }
    if rel.as_os_str().is_empty() {
        return Err(escape());
    }

    let joined = root.join(&rel);
    if let Ok(real_root) = root.canonicalize() {
        let mut probe = Some(joined.as_path());
        while let Some(candidate) = probe {
            if candidate.symlink_metadata().is_ok() {
                // Dangling symlinks fail to canonicalize; treat them as escapes.
                let real = candidate.canonicalize().map_err(|_| escape())?;
                if !real.starts_with(&real_root) {
                    return Err(escape());
                }
                break;
            }
            probe = candidate.parent();
        }
    }
    Ok(joined)
}

/// Unified diff from the current content of `path` to `incoming`.
///
/// `None` when nothing would change or either side is not UTF-8.
pub fn plan_diff(path: &Path, label: &str, incoming: &[u8]) -> Option<String> {
    let current = std::fs::read(path).unwrap_or_default();
    if current == incoming {
        return None;
    }
    let old = std::str::from_utf8(&current).ok()?;
    let new = std::str::from_utf8(incoming).ok()?;
    let diff = TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string();
    Some(diff)
}
