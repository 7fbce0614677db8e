//! Batch pipeline: one sequential pass over every selected alias.
//!
//! Configuration is loaded up front; a failure there (or an empty selection)
//! halts before any alias is touched. From then on nothing escapes the
//! per-alias boundary: every alias ends up as exactly one [`RepoOutcome`].

use std::path::PathBuf;
use std::time::Duration;

use harvest_core::feed::load_commit_catalog_at;
use harvest_core::harvest_map::{add_unmapped_specs, auto_focus_rules, load_harvest_map_at};
use harvest_core::registry::load_registry_at;
use harvest_core::{
    select_commits, CommitCatalog, Diagnostic, DiagnosticKind, HarvestSpec, Registry,
    RepoOutcome, RepositorySpec, RunOptions, Selection, SyncRule,
};

use crate::artifacts::write_commit_artifacts;
use crate::canon::Canonicalizer;
use crate::engine::{apply_rules, SyncContext};
use crate::error::{io_err, HarvestError};
use crate::mirror::{LocalMirror, MirrorManager};
use crate::source::BlobSource;
use crate::writer::contained_path;

/// Loaded configuration for one run.
#[derive(Debug, Clone)]
pub struct Workload {
    pub registry: Registry,
    pub specs: Vec<HarvestSpec>,
    pub catalog: CommitCatalog,
}

impl Workload {
    /// Load registry, harvest map and commit feed, then apply unmapped
    /// inclusion, the alias allow-list and enablement.
    pub fn load(options: &RunOptions) -> Result<Self, HarvestError> {
        let registry = load_registry_at(&options.registry_file)?;
        let filter = options.alias_filter();
        let mut specs = load_harvest_map_at(&options.map_file, &filter)?;
        if options.include_unmapped {
            specs = add_unmapped_specs(specs, &registry, &filter);
        }
        if !options.all_repos {
            specs.retain(|s| s.enabled);
        }
        if specs.is_empty() {
            return Err(HarvestError::EmptySelection);
        }
        let catalog = load_commit_catalog_at(&options.commit_scan_file)?;
        tracing::debug!(
            "{} registry entries, {} selected aliases",
            registry.len(),
            specs.len()
        );
        Ok(Self {
            registry,
            specs,
            catalog,
        })
    }

    /// Commit selection for `spec` without touching the network.
    pub fn selection_for(&self, spec: &HarvestSpec, max_commits: usize) -> Selection {
        let pinned = self
            .registry
            .get(&spec.alias)
            .map(|r| r.pinned_commits.as_slice())
            .unwrap_or_default();
        select_commits(
            &spec.commit_markers,
            pinned,
            self.catalog.commits(&spec.alias),
            max_commits,
        )
    }
}

/// Run the whole batch and return one outcome per selected alias, in
/// harvest-map order.
pub fn run(options: &RunOptions) -> Result<Vec<RepoOutcome>, HarvestError> {
    let workload = Workload::load(options)?;
    let mirrors = MirrorManager::new(
        &options.mirror_dir,
        Duration::from_secs(options.command_timeout_secs),
        Duration::from_secs(options.fetch_timeout_secs),
    );
    let canonicalizer = Canonicalizer::new(&options.patch_root);

    let outcomes = workload
        .specs
        .iter()
        .map(|spec| process_alias(options, &workload, &mirrors, &canonicalizer, spec))
        .collect();
    Ok(outcomes)
}

fn process_alias(
    options: &RunOptions,
    workload: &Workload,
    mirrors: &MirrorManager,
    canonicalizer: &Canonicalizer,
    spec: &HarvestSpec,
) -> RepoOutcome {
    let Some(repo) = workload.registry.get(&spec.alias) else {
        tracing::warn!("{}: not in the repository registry", spec.alias);
        return RepoOutcome::unknown_alias(spec.alias.clone());
    };

    let diagnostics: Vec<Diagnostic> = spec
        .rule_errors
        .iter()
        .map(|e| Diagnostic::new(DiagnosticKind::Config, e.clone()))
        .collect();

    let declared_nothing = spec.sync_rules.is_empty() && spec.rule_errors.is_empty();
    let (rules, auto_focus) = if options.auto_focus_sync && declared_nothing {
        let derived = auto_focus_rules(repo, &options.snapshot_root);
        let applied = !derived.is_empty();
        (derived, applied)
    } else {
        (spec.sync_rules.clone(), false)
    };

    if options.skip_no_sync && rules.is_empty() {
        tracing::info!("{}: no sync rules, skipping", spec.alias);
        let mut outcome = RepoOutcome::skipped_no_rules(repo);
        outcome.diagnostics = diagnostics;
        return outcome;
    }

    tracing::info!("processing {}", spec.alias);
    let mut outcome = RepoOutcome::processed(repo);
    outcome.auto_focus_sync = auto_focus;
    outcome.diagnostics = diagnostics;

    let alias = AliasRun {
        options,
        repo,
        spec,
        rules: &rules,
        canonicalizer,
    };
    if let Err(e) = alias.harvest(workload, mirrors, &mut outcome) {
        tracing::warn!("{}: {e}", spec.alias);
        let mut failed = RepoOutcome::failed(repo, e.to_string());
        failed.auto_focus_sync = outcome.auto_focus_sync;
        failed.resolved_branch = outcome.resolved_branch;
        failed.diagnostics = outcome.diagnostics;
        return failed;
    }

    tracing::info!(
        "{}: {} changed, {} unchanged, {} errors",
        spec.alias,
        outcome.sync_changed(),
        outcome.sync_unchanged(),
        outcome.sync_errors()
    );
    outcome
}

struct AliasRun<'a> {
    options: &'a RunOptions,
    repo: &'a RepositorySpec,
    spec: &'a HarvestSpec,
    rules: &'a [SyncRule],
    canonicalizer: &'a Canonicalizer,
}

impl AliasRun<'_> {
    /// Fatal steps return `Err`; everything else lands in `outcome`.
    fn harvest(
        &self,
        workload: &Workload,
        mirrors: &MirrorManager,
        outcome: &mut RepoOutcome,
    ) -> Result<(), HarvestError> {
        let alias_out = self.alias_out_dir()?;
        let mirror = mirrors.ensure(self.repo)?;
        let mut selection = workload.selection_for(self.spec, self.options.max_commits);

        let branch = mirror.resolve_branch(&self.repo.branch)?;
        if branch.drifted() {
            tracing::warn!(
                "{}: requested branch '{}' resolved to '{}'",
                self.spec.alias,
                branch.requested,
                branch.resolved
            );
        }
        outcome.resolved_branch = Some(branch.resolved.clone());

        mirror.fetch_branch(&branch.resolved, self.options.fetch_depth)?;
        mirror.fetch_pinned(selection.shas(), &mut outcome.diagnostics);
        mirror.configure_sparse(
            &self.spec.harvest_paths,
            &branch.resolved,
            &mut outcome.diagnostics,
        );
        outcome.head_sha = mirror.head_sha(&branch.resolved)?;

        std::fs::create_dir_all(&alias_out).map_err(|e| io_err(&alias_out, e))?;
        self.harvest_commits(&mirror, &alias_out, &mut selection, &mut outcome.diagnostics)?;

        let shadow_root = alias_out.join("synced");
        let ctx = SyncContext {
            repo_root: &self.options.repo_root,
            shadow_root: &shadow_root,
            branch: &branch.resolved,
            apply: self.options.apply,
            show_diff: self.options.show_diff,
            canonicalizer: self.canonicalizer,
        };
        outcome.sync_results = apply_rules(&mirror, &ctx, self.rules, &mut selection);
        outcome.selected_commits = selection.shas().to_vec();
        Ok(())
    }

    fn alias_out_dir(&self) -> Result<PathBuf, HarvestError> {
        contained_path(&self.options.out_dir, self.spec.alias.as_str())
    }

    /// Fill in missing changed paths and write per-commit artifacts.
    fn harvest_commits(
        &self,
        mirror: &LocalMirror,
        alias_out: &std::path::Path,
        selection: &mut Selection,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(), HarvestError> {
        for sha in selection.shas().to_vec() {
            let mut changed = selection.cached_changed_paths(&sha);
            if changed.is_empty() {
                match mirror.changed_paths(&sha) {
                    Ok(paths) => {
                        selection.set_changed_paths(&sha, paths.clone());
                        changed = paths;
                    }
                    Err(e) => diagnostics.push(Diagnostic::new(
                        DiagnosticKind::CommitArtifact,
                        format!("commit {sha}: changed paths unavailable: {e}"),
                    )),
                }
            }
            write_commit_artifacts(
                mirror,
                alias_out,
                &sha,
                &changed,
                &self.spec.harvest_paths,
                diagnostics,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::{RepoStatus, SyncStatus};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
    }

    impl Fixture {
        fn new(registry: &str, map: &str) -> Self {
            let root = TempDir::new().unwrap();
            fs::write(root.path().join("registry.json"), registry).unwrap();
            fs::write(root.path().join("map.json"), map).unwrap();
            Self { root }
        }

        fn options(&self) -> RunOptions {
            RunOptions {
                repo_root: self.root.path().to_path_buf(),
                registry_file: "registry.json".into(),
                map_file: "map.json".into(),
                commit_scan_file: "scan.json".into(),
                ..RunOptions::default()
            }
            .resolve()
        }
    }

    const REGISTRY: &str = r#"[
        {"alias": "alpha", "owner": "o", "repo": "alpha", "focus_paths": ["a.txt"]},
        {"alias": "beta", "owner": "o", "repo": "beta"}
    ]"#;

    #[test]
    fn empty_selection_halts() {
        let fx = Fixture::new(REGISTRY, r#"{"repos": [{"alias": "beta", "enabled": false}]}"#);
        let mut opts = fx.options();
        opts.include_unmapped = false;
        let err = run(&opts).unwrap_err();
        assert!(matches!(err, HarvestError::EmptySelection));
    }

    #[test]
    fn missing_registry_is_fatal() {
        let fx = Fixture::new(REGISTRY, "[]");
        fs::remove_file(fx.root.path().join("registry.json")).unwrap();
        assert!(matches!(run(&fx.options()), Err(HarvestError::Config(_))));
    }

    #[test]
    fn all_repos_includes_disabled_specs() {
        let fx = Fixture::new(REGISTRY, r#"[{"alias": "beta", "enabled": false}]"#);
        let mut opts = fx.options();
        opts.include_unmapped = false;
        opts.all_repos = true;
        let workload = Workload::load(&opts).unwrap();
        assert_eq!(workload.specs.len(), 1);
    }

    #[test]
    fn unknown_alias_and_skip_no_rules_need_no_git() {
        let fx = Fixture::new(
            REGISTRY,
            r#"[{"alias": "ghost"}, {"alias": "beta"}]"#,
        );
        let mut opts = fx.options();
        opts.include_unmapped = false;
        let outcomes = run(&opts).unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].alias.as_str(), "ghost");
        assert_eq!(outcomes[0].status, RepoStatus::Error);
        assert!(outcomes[0].is_error());
        assert_eq!(outcomes[1].status, RepoStatus::SkippedNoSyncRules);
        assert!(!outcomes[1].is_error());
    }

    #[test]
    fn malformed_rules_are_config_diagnostics() {
        let fx = Fixture::new(
            REGISTRY,
            r#"[{"alias": "beta", "sync_rules": [{"kind": "teleport"}]}]"#,
        );
        let mut opts = fx.options();
        opts.include_unmapped = false;
        let outcomes = run(&opts).unwrap();
        assert_eq!(outcomes[0].status, RepoStatus::SkippedNoSyncRules);
        assert_eq!(outcomes[0].config_errors(), 1);
        assert!(outcomes[0].is_error());
    }

    #[test]
    fn unreachable_remote_fails_only_that_alias() {
        let registry = r#"[
            {"alias": "alpha", "owner": "o", "repo": "alpha", "url": "file:///nonexistent/harvest/alpha.git"},
            {"alias": "beta", "owner": "o", "repo": "beta"}
        ]"#;
        let map = r#"[
            {"alias": "alpha", "sync_rules": [{"kind": "path_copy", "source": "a", "target": "b"}]},
            {"alias": "beta"}
        ]"#;
        let fx = Fixture::new(registry, map);
        let mut opts = fx.options();
        opts.include_unmapped = false;
        let outcomes = run(&opts).unwrap();

        assert_eq!(outcomes[0].status, RepoStatus::Error);
        assert!(outcomes[0].error.is_some());
        assert!(outcomes[0].sync_results.is_empty());
        assert_eq!(outcomes[1].status, RepoStatus::SkippedNoSyncRules);
        assert_eq!(outcomes[1].count(SyncStatus::Error), 0);
    }

    #[test]
    fn selection_preview_uses_pins() {
        let registry = r#"[{"alias": "alpha", "owner": "o", "repo": "alpha", "pinned_commits": ["p1", "p2"]}]"#;
        let fx = Fixture::new(registry, r#"[{"alias": "alpha"}]"#);
        let opts = fx.options();
        let workload = Workload::load(&opts).unwrap();
        let sel = workload.selection_for(&workload.specs[0], 1);
        assert_eq!(sel.shas(), ["p1".to_string()]);
    }
}
