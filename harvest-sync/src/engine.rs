//! Sync Rule Engine: turns declarative rules into materializations.
//!
//! Every materialization goes through the same steps:
//!
//! 1. containment check of the target against the repo root;
//! 2. canonicalization against the current target content;
//! 3. unconditional write to the alias-scoped shadow mirror;
//! 4. in apply mode, a content-gated write of the real target.
//!
//! Nothing here returns `Err`: each problem becomes a [`SyncResult`] with
//! status `error` (or `skipped_missing` for an allowed missing blob).

use std::collections::BTreeMap;
use std::path::Path;

use harvest_core::{
    ChangedPathRule, PathCopyRule, RefSelector, RuleKind, Selection, SyncResult, SyncRule,
    SyncStatus,
};

use crate::canon::Canonicalizer;
use crate::error::HarvestError;
use crate::mirror::tracking_ref;
use crate::source::BlobSource;
use crate::writer::{contained_path, plan_diff, write_if_changed, WriteOutcome};

/// Resolve a rule's ref selector to a concrete revision.
pub fn resolve_ref(selector: &RefSelector, branch: &str, latest: Option<&str>) -> String {
    match selector {
        RefSelector::Head => tracking_ref(branch),
        RefSelector::LatestCommit => match latest {
            Some(sha) if !sha.is_empty() => sha.to_string(),
            _ => tracking_ref(branch),
        },
        RefSelector::Commit(sha) => sha.clone(),
        RefSelector::Named(name) => name.clone(),
    }
}

/// Where and how materializations are written for one alias.
#[derive(Debug, Clone)]
pub struct SyncContext<'a> {
    /// Sandbox every target must stay inside.
    pub repo_root: &'a Path,
    /// `<out>/<alias>/synced`.
    pub shadow_root: &'a Path,
    /// Resolved branch.
    pub branch: &'a str,
    /// `false` is plan mode: shadow only, real targets report `planned`.
    pub apply: bool,
    /// Attach a unified diff to planned results.
    pub show_diff: bool,
    pub canonicalizer: &'a Canonicalizer,
}

/// Run every rule in order for one alias.
pub fn apply_rules<S: BlobSource>(
    source: &S,
    ctx: &SyncContext<'_>,
    rules: &[SyncRule],
    selection: &mut Selection,
) -> Vec<SyncResult> {
    let mut results = Vec::new();
    for rule in rules {
        match rule {
            SyncRule::PathCopy(rule) => {
                results.push(path_copy(source, ctx, rule, selection.latest()));
            }
            SyncRule::ChangedPathSync(rule) => {
                results.extend(changed_path_sync(source, ctx, rule, selection));
            }
        }
    }
    results
}

fn path_copy<S: BlobSource>(
    source: &S,
    ctx: &SyncContext<'_>,
    rule: &PathCopyRule,
    latest: Option<&str>,
) -> SyncResult {
    let reference = resolve_ref(&rule.reference, ctx.branch, latest);
    let result = SyncResult::new(RuleKind::PathCopy, &rule.source, &rule.target, &reference);
    if let Err(e) = contained_path(ctx.repo_root, &rule.target) {
        tracing::warn!("{} -> {}: {e}", rule.source, rule.target);
        return result.failed(e.to_string());
    }

    match source.read_blob(&reference, &rule.source) {
        Ok(data) => materialize(ctx, result, data),
        Err(e) if rule.allow_missing => {
            tracing::debug!("{}: allowed missing ({e})", rule.source);
            result.with_status(SyncStatus::SkippedMissing)
        }
        Err(e) => result.failed(e.to_string()),
    }
}

fn changed_path_sync<S: BlobSource>(
    source: &S,
    ctx: &SyncContext<'_>,
    rule: &ChangedPathRule,
    selection: &mut Selection,
) -> Vec<SyncResult> {
    let mut results = Vec::new();
    // path → owning sha; the first commit in selection order wins.
    let mut owners: BTreeMap<String, String> = BTreeMap::new();

    let shas: Vec<String> = selection.shas().to_vec();
    for sha in &shas {
        let mut changed = selection.cached_changed_paths(sha);
        if changed.is_empty() {
            match source.changed_paths(sha) {
                Ok(paths) => {
                    selection.set_changed_paths(sha, paths.clone());
                    changed = paths;
                }
                Err(e) => {
                    results.push(
                        SyncResult::new(
                            RuleKind::ChangedPathSync,
                            &rule.source_prefix,
                            &rule.target_prefix,
                            sha,
                        )
                        .failed(e.to_string()),
                    );
                    continue;
                }
            }
        }
        for path in changed.into_iter().filter(|p| rule.matches(p)) {
            owners.entry(path).or_insert_with(|| sha.clone());
        }
    }

    for (path, sha) in owners {
        let Some(target) = rule.retarget(&path) else {
            continue;
        };
        let result = SyncResult::new(RuleKind::ChangedPathSync, &path, &target, &sha);
        results.push(match source.read_blob(&sha, &path) {
            Ok(data) => materialize(ctx, result, data),
            Err(e) => result.failed(e.to_string()),
        });
    }
    results
}

fn materialize(ctx: &SyncContext<'_>, result: SyncResult, data: Vec<u8>) -> SyncResult {
    match try_materialize(ctx, &result, data) {
        Ok((status, diff)) => {
            let mut result = result.with_status(status);
            result.diff = diff;
            result
        }
        Err(e) => {
            tracing::warn!("{} -> {}: {e}", result.source, result.target);
            result.failed(e.to_string())
        }
    }
}

fn try_materialize(
    ctx: &SyncContext<'_>,
    result: &SyncResult,
    data: Vec<u8>,
) -> Result<(SyncStatus, Option<String>), HarvestError> {
    let target_path = contained_path(ctx.repo_root, &result.target)?;
    let existing = std::fs::read(&target_path).ok();
    let data = ctx
        .canonicalizer
        .canonicalize(&result.target, data, existing.as_deref())?;

    let shadow = contained_path(&ctx.shadow_root.join(result.kind.as_str()), &result.source)?;
    write_if_changed(&shadow, &data)?;

    if !ctx.apply {
        let diff = if ctx.show_diff {
            plan_diff(&target_path, &result.target, &data)
        } else {
            None
        };
        return Ok((SyncStatus::Planned, diff));
    }

    let status = match write_if_changed(&target_path, &data)? {
        WriteOutcome::Written => SyncStatus::Changed,
        WriteOutcome::Unchanged => SyncStatus::Unchanged,
    };
    Ok((status, None))
}
