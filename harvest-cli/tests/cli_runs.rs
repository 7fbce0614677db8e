use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

/// `harvest <args> --repo-root <root>` with the workspace file layout below.
fn harvest_cmd(root: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("harvest"));
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd.args(args).arg("--repo-root").arg(root).args([
        "--registry",
        "registry.json",
        "--map",
        "map.json",
        "--commit-scan",
        "scan.json",
        "--out-dir",
        "out",
    ]);
    cmd
}

fn write_json(path: &Path, value: serde_json::Value) {
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

/// Registry with one alias that has no sync rules, plus a map entry naming an
/// alias the registry does not know. Neither needs the network.
fn offline_workspace() -> TempDir {
    let root = TempDir::new().unwrap();
    write_json(
        &root.path().join("registry.json"),
        serde_json::json!([
            {"alias": "alpha", "owner": "upstream", "repo": "alpha", "branch": "legacy"}
        ]),
    );
    write_json(
        &root.path().join("map.json"),
        serde_json::json!({"repos": [{"alias": "alpha"}, {"alias": "ghost"}]}),
    );
    root
}

#[test]
fn transfer_writes_reports_and_stays_green_by_default() {
    let root = offline_workspace();
    harvest_cmd(root.path(), &["transfer"])
        .assert()
        .success()
        .stdout(contains("alpha"))
        .stdout(contains("skipped_no_sync_rules"))
        .stdout(contains("ghost: alias not found in repository registry"))
        .stdout(contains("transfer-report.json"));

    let report: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(root.path().join("out/transfer-report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["repo_errors"], 1);
    assert_eq!(report["repos"][0]["alias"], "alpha");
    assert_eq!(report["repos"][1]["status"], "error");
    assert!(root.path().join("out/transfer-report.md").exists());
}

#[test]
fn fail_on_errors_turns_repo_errors_into_exit_code() {
    let root = offline_workspace();
    harvest_cmd(root.path(), &["transfer", "--fail-on-errors"])
        .assert()
        .code(1);
    assert!(root.path().join("out/transfer-report.json").exists());
}

#[test]
fn empty_alias_selection_halts_before_reports() {
    let root = offline_workspace();
    harvest_cmd(root.path(), &["transfer", "--aliases", "nobody"])
        .assert()
        .failure()
        .stderr(contains("no repository entries selected"));
    assert!(!root.path().join("out").exists());
}

#[test]
fn plan_and_apply_flags_conflict() {
    let root = offline_workspace();
    harvest_cmd(root.path(), &["transfer", "--plan", "--apply"])
        .assert()
        .failure()
        .stderr(contains("cannot be used with"));
}

#[test]
fn select_previews_markers_then_pins_as_json() {
    let root = offline_workspace();
    let pinned = "c".repeat(40);
    write_json(
        &root.path().join("registry.json"),
        serde_json::json!([
            {"alias": "alpha", "owner": "upstream", "repo": "alpha", "pinned_commits": [pinned]}
        ]),
    );
    write_json(
        &root.path().join("map.json"),
        serde_json::json!([{"alias": "alpha", "commit_markers": ["wow64"]}]),
    );
    write_json(
        &root.path().join("scan.json"),
        serde_json::json!({"reports": {"alpha": {"commits": [
            {"sha": "a", "sha_full": "a".repeat(40), "markers": ["wow64"], "message": "wow64: fix"},
            {"sha": "b", "sha_full": "b".repeat(40), "markers": ["audio"], "message": "audio"}
        ]}}}),
    );

    let output = harvest_cmd(root.path(), &["select", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let selections: serde_json::Value = serde_json::from_slice(&output).unwrap();

    let shas: Vec<&str> = selections[0]["commits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["sha"].as_str().unwrap())
        .collect();
    assert_eq!(shas, vec!["a".repeat(40), pinned]);
    assert_eq!(selections[0]["markers"], serde_json::json!(["wow64"]));
}

#[test]
fn pin_branches_dry_run_then_write() {
    let root = offline_workspace();
    fs::create_dir_all(root.path().join("out")).unwrap();
    write_json(
        &root.path().join("out/transfer-report.json"),
        serde_json::json!({"repos": [
            {"alias": "alpha", "branch": "legacy", "resolved_branch": "main", "status": "processed"}
        ]}),
    );
    let before = fs::read_to_string(root.path().join("registry.json")).unwrap();

    harvest_cmd(root.path(), &["pin-branches", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run] alpha: legacy → main"))
        .stdout(contains("would update 1 entry"));
    assert_eq!(fs::read_to_string(root.path().join("registry.json")).unwrap(), before);

    harvest_cmd(root.path(), &["pin-branches"])
        .assert()
        .success()
        .stdout(contains("updated 1 entry"))
        .stdout(predicate::str::contains("[dry-run]").not().from_utf8());
    let registry: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.path().join("registry.json")).unwrap())
            .unwrap();
    assert_eq!(registry[0]["branch"], "main");
}
