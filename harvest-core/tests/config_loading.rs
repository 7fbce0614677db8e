//! Registry / harvest map / feed loading, end to end through files on disk.

use assert_fs::prelude::*;
use harvest_core::{
    feed::load_commit_catalog_at,
    harvest_map::{add_unmapped_specs, auto_focus_rules, load_harvest_map_at},
    registry::load_registry_at,
    select_commits, Alias, AliasFilter, ConfigError, SyncRule,
};
use predicates::prelude::predicate;

const REGISTRY: &str = r#"[
  {"alias": "coffin_wine", "owner": "coffincolors", "repo": "wine", "branch": "arm64ec",
   "focus_paths": ["dlls/ntdll/loader.c"], "pinned_commits": ["p1"]},
  {"alias": "tkg", "owner": "Frogging-Family", "repo": "wine-tkg-git", "branch": "master",
   "enabled_default": false, "focus_paths": ["wine-tkg-git/customization.cfg"]}
]"#;

const MAP_YAML: &str = r#"
repos:
  - alias: coffin_wine
    harvest_paths: [dlls/ntdll]
    commit_markers: [wow64]
    sync_rules:
      - kind: changed_path_sync
        source_prefix: android/patches/
        target_prefix: local/patches
  - alias: ghost
"#;

const FEED: &str = r#"{"reports": {"coffin_wine": {"commits": [
  {"sha": "aaa", "sha_full": "aaa111", "markers": ["wow64"], "changed_paths": ["android/patches/x.patch"]},
  {"sha": "bbb", "sha_full": "bbb222", "markers": ["unrelated"]}
]}}}"#;

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

#[test]
fn yaml_map_and_json_registry_load_together() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let registry_file = dir.child("repos.json");
    registry_file.write_str(REGISTRY).unwrap();
    let map_file = dir.child("map.yaml");
    map_file.write_str(MAP_YAML).unwrap();

    let registry = load_registry_at(registry_file.path()).expect("registry");
    let specs = load_harvest_map_at(map_file.path(), &AliasFilter::default()).expect("map");

    assert_eq!(registry.len(), 2);
    assert_eq!(specs.len(), 2);
    match &specs[0].sync_rules[0] {
        SyncRule::ChangedPathSync(rule) => assert_eq!(rule.source_prefix, "android/patches"),
        other => panic!("expected changed_path_sync, got {other:?}"),
    }
    // "ghost" is kept so the pipeline can report it as an unknown alias.
    assert!(!registry.contains(&specs[1].alias));
}

#[test]
fn unmapped_registry_alias_gets_auto_rules() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let registry_file = dir.child("repos.json");
    registry_file.write_str(REGISTRY).unwrap();
    let map_file = dir.child("map.yaml");
    map_file.write_str(MAP_YAML).unwrap();

    let registry = load_registry_at(registry_file.path()).unwrap();
    let filter = AliasFilter::default();
    let specs = add_unmapped_specs(
        load_harvest_map_at(map_file.path(), &filter).unwrap(),
        &registry,
        &filter,
    );
    let tkg = specs
        .iter()
        .find(|s| s.alias == Alias::from("tkg"))
        .expect("tkg synthesized");
    assert!(!tkg.enabled);

    let repo = registry.get(&tkg.alias).unwrap();
    let rules = auto_focus_rules(repo, "snapshots");
    assert_eq!(rules.len(), 1);
}

#[test]
fn corrupt_registry_reports_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let registry_file = dir.child("repos.json");
    registry_file.write_str("[{ not json").unwrap();

    let err = load_registry_at(registry_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Json { .. }), "got: {err}");
    assert!(err.to_string().contains("repos.json"));
}

#[test]
fn registry_must_be_a_list() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let registry_file = dir.child("repos.json");
    registry_file.write_str(r#"{"alias": "x"}"#).unwrap();

    let err = load_registry_at(registry_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Feed + selection
// ---------------------------------------------------------------------------

#[test]
fn feed_and_markers_drive_selection() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let registry_file = dir.child("repos.json");
    registry_file.write_str(REGISTRY).unwrap();
    let feed_file = dir.child("scan.json");
    feed_file.write_str(FEED).unwrap();
    feed_file.assert(predicate::path::exists());

    let registry = load_registry_at(registry_file.path()).unwrap();
    let catalog = load_commit_catalog_at(feed_file.path()).unwrap();
    let alias = Alias::from("coffin_wine");
    let repo = registry.get(&alias).unwrap();

    let selection = select_commits(
        &["wow64".to_string()],
        &repo.pinned_commits,
        catalog.commits(&alias),
        24,
    );
    assert_eq!(selection.shas(), &["aaa111".to_string(), "p1".to_string()][..]);
    assert_eq!(
        selection.cached_changed_paths("aaa111"),
        vec!["android/patches/x.patch".to_string()]
    );
}
