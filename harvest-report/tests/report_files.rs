use harvest_core::{
    Alias, Diagnostic, DiagnosticKind, RepoOutcome, RepositorySpec, RuleKind, RunOptions,
    SyncResult, SyncStatus,
};
use harvest_report::{load_resolved_branches, write_reports, TransferReport};
use tempfile::TempDir;

fn spec(alias: &str, branch: &str) -> RepositorySpec {
    RepositorySpec {
        alias: Alias::from(alias),
        owner: "upstream".to_string(),
        repo: alias.to_string(),
        branch: branch.to_string(),
        enabled_default: true,
        focus_paths: vec!["dlls/x.c".to_string()],
        pinned_commits: vec![],
        url: None,
    }
}

fn sample_outcomes() -> Vec<RepoOutcome> {
    let mut alpha = RepoOutcome::processed(&spec("alpha", "legacy"));
    alpha.resolved_branch = Some("main".to_string());
    alpha.head_sha = "abcdef0123456789abcdef0123456789abcdef01".to_string();
    alpha.auto_focus_sync = true;
    alpha.sync_results = vec![
        SyncResult::new(RuleKind::PathCopy, "dlls/x.c", "snap/alpha/dlls/x.c", "refs/remotes/origin/main")
            .with_status(SyncStatus::Changed),
        SyncResult::new(RuleKind::PathCopy, "dlls/y.c", "snap/alpha/dlls/y.c", "refs/remotes/origin/main")
            .with_status(SyncStatus::SkippedMissing),
    ];
    alpha
        .diagnostics
        .push(Diagnostic::new(DiagnosticKind::SparseCheckout, "sparse-checkout set failed"));

    let beta = RepoOutcome::skipped_no_rules(&spec("beta", "main"));
    let ghost = RepoOutcome::unknown_alias(Alias::from("ghost"));
    vec![alpha, beta, ghost]
}

#[test]
fn json_and_markdown_describe_the_same_run() {
    let tmp = TempDir::new().unwrap();
    let options = RunOptions {
        apply: false,
        ..RunOptions::default()
    };
    let report = TransferReport::build(&options, &sample_outcomes());
    let paths = write_reports(tmp.path(), &report).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(json["apply_changes"], false);
    assert_eq!(json["repo_errors"], 1);
    assert_eq!(json["repos"].as_array().unwrap().len(), 3);
    assert_eq!(json["repos"][0]["sync_changed"], 1);
    assert_eq!(json["repos"][0]["diagnostics"][0]["kind"], "sparse_checkout");
    assert_eq!(json["repos"][1]["status"], "skipped_no_sync_rules");
    assert_eq!(json["repos"][2]["status"], "error");

    let md = std::fs::read_to_string(&paths.markdown).unwrap();
    assert!(md.contains("- apply_changes: `0`\n"));
    assert!(md.contains("- repo_errors: **1**\n- repos: **3**\n"));
    assert!(md.contains("## alpha\n"));
    assert!(md.contains("- head_sha: `abcdef012345`\n"));
    assert!(md.contains("- auto_focus_sync: `1`\n"));
    assert!(md.contains("- sparse_checkout: sparse-checkout set failed\n"));
    assert!(md.contains("| `dlls/y.c` | `snap/alpha/dlls/y.c` | `refs/remotes/origin/main` | `skipped_missing` |"));
    assert!(md.contains("## beta\n"));
    assert!(md.contains("- status: `skipped_no_sync_rules`\n"));
    assert!(md.contains("## ghost\n"));
}

#[test]
fn rewriting_reports_replaces_previous_content() {
    let tmp = TempDir::new().unwrap();
    let options = RunOptions::default();
    write_reports(tmp.path(), &TransferReport::build(&options, &sample_outcomes())).unwrap();
    let paths = write_reports(tmp.path(), &TransferReport::build(&options, &[])).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(json["repos"], serde_json::json!([]));
    assert!(!std::fs::read_to_string(&paths.markdown)
        .unwrap()
        .contains("## alpha"));
}

#[test]
fn resolved_branches_prefer_resolution_over_request() {
    let tmp = TempDir::new().unwrap();
    let report = TransferReport::build(&RunOptions::default(), &sample_outcomes());
    let paths = write_reports(tmp.path(), &report).unwrap();

    let branches = load_resolved_branches(&paths.json).unwrap();
    assert_eq!(
        branches.into_iter().collect::<Vec<_>>(),
        vec![
            (Alias::from("alpha"), "main".to_string()),
            (Alias::from("beta"), "main".to_string()),
        ]
    );
}
