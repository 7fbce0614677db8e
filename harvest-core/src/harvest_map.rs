//! Harvest map: alias → enablement, harvest paths, commit markers, sync rules.
//!
//! Parsing is lenient per entry. A row whose sync rules are partly malformed
//! still loads; the bad entries are kept as `rule_errors` so the pipeline can
//! report them against that alias without touching the rest of the batch.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::document::{read_document, rows};
use crate::error::{invalid, ConfigError};
use crate::registry::Registry;
use crate::types::{
    clean_list, clean_paths, Alias, HarvestSpec, PathCopyRule, RawSyncRule, RefSelector,
    RepositorySpec, SyncRule,
};

/// Default root for auto-derived focus-path snapshots.
pub const DEFAULT_SNAPSHOT_ROOT: &str = "ci/reverse/upstream_snapshots";

/// Optional alias allow-list. Empty means "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasFilter(BTreeSet<Alias>);

impl AliasFilter {
    /// Parse a comma-separated list, ignoring blanks.
    pub fn parse_csv(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Alias::from)
                .collect(),
        )
    }

    pub fn from_aliases<I: IntoIterator<Item = Alias>>(aliases: I) -> Self {
        Self(aliases.into_iter().collect())
    }

    pub fn allows(&self, alias: &Alias) -> bool {
        self.0.is_empty() || self.0.contains(alias)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawHarvestSpec {
    alias: String,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    harvest_paths: Vec<String>,
    #[serde(default)]
    commit_markers: Vec<String>,
    #[serde(default)]
    sync_rules: Vec<Value>,
}

fn default_true() -> bool {
    true
}

/// Load the harvest map at `path`, keeping only aliases `filter` allows.
pub fn load_harvest_map_at(
    path: &Path,
    filter: &AliasFilter,
) -> Result<Vec<HarvestSpec>, ConfigError> {
    let doc = read_document(path)?;
    let Some(entries) = rows(&doc, "repos") else {
        return Err(invalid(path, "harvest map must be an array or an object with 'repos'"));
    };

    let mut specs = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let raw = match serde_json::from_value::<RawHarvestSpec>(entry.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                // Keep the alias visible in the report when we can still find it.
                match entry.get("alias").and_then(Value::as_str).map(str::trim) {
                    Some(alias) if !alias.is_empty() => {
                        let alias = Alias::from(alias);
                        if filter.allows(&alias) {
                            let mut spec = HarvestSpec::empty(alias);
                            spec.rule_errors.push(format!("malformed harvest map entry: {e}"));
                            specs.push(spec);
                        }
                    }
                    _ => tracing::warn!(
                        "harvest map {}: skipping entry #{index}: {e}",
                        path.display()
                    ),
                }
                continue;
            }
        };
        let alias = raw.alias.trim();
        if alias.is_empty() {
            continue;
        }
        let alias = Alias::from(alias);
        if !filter.allows(&alias) {
            continue;
        }
        specs.push(convert(alias, raw));
    }
    Ok(specs)
}

fn convert(alias: Alias, raw: RawHarvestSpec) -> HarvestSpec {
    let mut sync_rules = Vec::new();
    let mut rule_errors = Vec::new();
    for (index, value) in raw.sync_rules.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RawSyncRule>(value)
            .map_err(|e| e.to_string())
            .and_then(RawSyncRule::into_rule);
        match parsed {
            Ok(rule) => sync_rules.push(rule),
            Err(reason) => rule_errors.push(format!("sync rule #{index}: {reason}")),
        }
    }
    HarvestSpec {
        alias,
        enabled: raw.enabled,
        harvest_paths: clean_paths(&raw.harvest_paths),
        commit_markers: clean_list(&raw.commit_markers),
        sync_rules,
        rule_errors,
    }
}

/// Append a synthetic spec for every registry alias that has focus paths but
/// no map entry. New specs are appended in alias order.
pub fn add_unmapped_specs(
    mut specs: Vec<HarvestSpec>,
    registry: &Registry,
    filter: &AliasFilter,
) -> Vec<HarvestSpec> {
    let mapped: BTreeSet<Alias> = specs.iter().map(|s| s.alias.clone()).collect();
    for repo in registry.sorted() {
        if mapped.contains(&repo.alias) || !filter.allows(&repo.alias) {
            continue;
        }
        if repo.focus_paths.is_empty() {
            continue;
        }
        specs.push(HarvestSpec {
            alias: repo.alias.clone(),
            enabled: repo.enabled_default,
            harvest_paths: repo.focus_paths.clone(),
            commit_markers: vec![],
            sync_rules: vec![],
            rule_errors: vec![],
        });
    }
    specs
}

/// One `path_copy` rule per focus path, landing under
/// `<snapshot_root>/<alias>/<path>`. Missing upstream files are tolerated.
pub fn auto_focus_rules(repo: &RepositorySpec, snapshot_root: &str) -> Vec<SyncRule> {
    let root = snapshot_root.trim().trim_end_matches('/');
    repo.focus_paths
        .iter()
        .map(|p| p.trim().trim_start_matches('/'))
        .filter(|p| !p.is_empty())
        .map(|path| {
            SyncRule::PathCopy(PathCopyRule {
                source: path.to_string(),
                target: format!("{root}/{}/{path}", repo.alias),
                reference: RefSelector::Head,
                allow_missing: true,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(alias: &str, focus: &[&str], enabled: bool) -> RepositorySpec {
        RepositorySpec {
            alias: Alias::from(alias),
            owner: "o".to_string(),
            repo: alias.to_string(),
            branch: "main".to_string(),
            enabled_default: enabled,
            focus_paths: focus.iter().map(|s| s.to_string()).collect(),
            pinned_commits: vec![],
            url: None,
        }
    }

    #[test]
    fn malformed_rules_are_kept_as_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("map.json");
        std::fs::write(
            &path,
            r#"{"repos": [{"alias": "a", "sync_rules": [
                {"kind": "path_copy", "source": "x", "target": "y"},
                {"kind": "bogus"},
                42
            ]}]}"#,
        )
        .unwrap();
        let specs = load_harvest_map_at(&path, &AliasFilter::default()).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].sync_rules.len(), 1);
        assert_eq!(specs[0].rule_errors.len(), 2);
    }

    #[test]
    fn filter_drops_other_aliases() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("map.json");
        std::fs::write(&path, r#"[{"alias": "a"}, {"alias": "b"}]"#).unwrap();
        let specs = load_harvest_map_at(&path, &AliasFilter::parse_csv(" b ,")).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].alias, Alias::from("b"));
    }

    #[test]
    fn unmapped_aliases_with_focus_paths_are_added() {
        let registry = Registry::new(vec![
            repo("zeta", &["a.c"], false),
            repo("alpha", &["b.c"], true),
            repo("bare", &[], true),
            repo("mapped", &["c.c"], true),
        ])
        .unwrap();
        let specs = vec![HarvestSpec::empty(Alias::from("mapped"))];
        let out = add_unmapped_specs(specs, &registry, &AliasFilter::default());
        let aliases: Vec<_> = out.iter().map(|s| s.alias.0.as_str()).collect();
        assert_eq!(aliases, vec!["mapped", "alpha", "zeta"]);
        assert!(!out[2].enabled, "enabled follows enabled_default");
        assert_eq!(out[1].harvest_paths, vec!["b.c".to_string()]);
    }

    #[test]
    fn auto_focus_rules_land_under_snapshot_root() {
        let rules = auto_focus_rules(&repo("wine", &["dlls/x.c"], true), DEFAULT_SNAPSHOT_ROOT);
        assert_eq!(rules.len(), 1);
        match &rules[0] {
            SyncRule::PathCopy(rule) => {
                assert_eq!(rule.target, "ci/reverse/upstream_snapshots/wine/dlls/x.c");
                assert!(rule.allow_missing);
                assert_eq!(rule.reference, RefSelector::Head);
            }
            other => panic!("expected path_copy, got {other:?}"),
        }
    }
}
