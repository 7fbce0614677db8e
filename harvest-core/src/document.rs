//! Format-agnostic configuration documents.
//!
//! Registry, harvest map and commit feed may be JSON or YAML; the format is
//! chosen from the file extension (`.yaml` / `.yml` → YAML, anything else →
//! JSON). Everything is parsed into a `serde_json::Value` first so the loaders
//! can be lenient per entry.

use std::path::Path;

use serde_json::Value;

use crate::error::{io_err, ConfigError};

/// On-disk format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                DocumentFormat::Yaml
            }
            _ => DocumentFormat::Json,
        }
    }
}

/// Read and parse `path`. Returns [`ConfigError::NotFound`] if absent.
pub fn read_document(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_document(path, &contents)
}

pub(crate) fn parse_document(path: &Path, contents: &str) -> Result<Value, ConfigError> {
    match DocumentFormat::for_path(path) {
        DocumentFormat::Json => serde_json::from_str(contents).map_err(|e| ConfigError::Json {
            path: path.to_path_buf(),
            source: e,
        }),
        DocumentFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| ConfigError::Yaml {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Serialize `value` in the format implied by `path` and replace the file
/// atomically (`.tmp` sibling + rename).
pub fn write_document(path: &Path, value: &Value) -> Result<(), ConfigError> {
    let rendered = match DocumentFormat::for_path(path) {
        DocumentFormat::Json => format!("{}\n", serde_json::to_string_pretty(value)?),
        DocumentFormat::Yaml => serde_yaml::to_string(value)?,
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, rendered).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Accept either a bare array or an object holding the array under `key`.
pub(crate) fn rows<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(rows) => Some(rows),
        Value::Object(map) => map.get(key).and_then(Value::as_array),
        _ => None,
    }
}
