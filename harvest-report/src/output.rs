//! Report files on disk.
//!
//! ```text
//! <out_dir>/
//!   transfer-report.json
//!   transfer-report.md
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use harvest_core::Alias;

use crate::context::TransferReport;
use crate::engine::ReportRenderer;
use crate::error::{io_err, ReportError};

pub const JSON_REPORT: &str = "transfer-report.json";
pub const MARKDOWN_REPORT: &str = "transfer-report.md";

/// Paths of the two files written by [`write_reports`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Write both report files into `out_dir`, creating it if needed.
pub fn write_reports(out_dir: &Path, report: &TransferReport) -> Result<ReportPaths, ReportError> {
    std::fs::create_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;
    let renderer = ReportRenderer::new()?;

    let paths = ReportPaths {
        json: out_dir.join(JSON_REPORT),
        markdown: out_dir.join(MARKDOWN_REPORT),
    };
    replace_file(&paths.json, &report.to_json()?)?;
    replace_file(&paths.markdown, &renderer.markdown(report)?)?;
    tracing::info!("wrote {}", paths.json.display());
    tracing::info!("wrote {}", paths.markdown.display());
    Ok(paths)
}

fn replace_file(path: &Path, contents: &str) -> Result<(), ReportError> {
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Alias → branch actually fetched, read back from a JSON report.
///
/// Falls back to the requested branch when no resolution was recorded;
/// aliases with neither are left out.
pub fn load_resolved_branches(path: &Path) -> Result<BTreeMap<Alias, String>, ReportError> {
    let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let doc: Value = serde_json::from_str(&raw).map_err(|e| ReportError::Invalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let Some(repos) = doc.get("repos").and_then(Value::as_array) else {
        return Err(ReportError::Invalid {
            path: path.to_path_buf(),
            reason: "missing 'repos' array".to_string(),
        });
    };

    let text = |row: &Value, key: &str| {
        row.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut branches = BTreeMap::new();
    for row in repos {
        let Some(alias) = text(row, "alias") else {
            continue;
        };
        if let Some(branch) = text(row, "resolved_branch").or_else(|| text(row, "branch")) {
            branches.insert(Alias::from(alias), branch);
        }
    }
    Ok(branches)
}
