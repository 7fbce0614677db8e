//! Commit Selector.
//!
//! Order of preference:
//! 1. fed commits whose markers intersect the wanted markers, in feed order
//!    (an empty marker list makes every fed commit eligible);
//! 2. pinned commits not already selected.
//!
//! Deduplicated by full sha and capped at `max` entries.

use std::collections::{BTreeMap, HashSet};

use crate::types::CommitRecord;

/// Selected shas plus their metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    shas: Vec<String>,
    meta: BTreeMap<String, CommitRecord>,
}

impl Selection {
    /// Selected full shas, in selection order.
    pub fn shas(&self) -> &[String] {
        &self.shas
    }

    pub fn len(&self) -> usize {
        self.shas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shas.is_empty()
    }

    /// Most recently selected commit: the first one, since the feed is newest-first.
    pub fn latest(&self) -> Option<&str> {
        self.shas.first().map(String::as_str)
    }

    pub fn record(&self, sha: &str) -> Option<&CommitRecord> {
        self.meta.get(sha)
    }

    /// Non-blank changed paths the feed (or an earlier lookup) supplied.
    pub fn cached_changed_paths(&self, sha: &str) -> Vec<String> {
        self.meta
            .get(sha)
            .map(|rec| {
                rec.changed_paths
                    .iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cache changed paths discovered after selection.
    pub fn set_changed_paths(&mut self, sha: &str, paths: Vec<String>) {
        if let Some(rec) = self.meta.get_mut(sha) {
            rec.changed_paths = paths;
        }
    }

    fn push(&mut self, sha: String, record: CommitRecord) {
        self.meta.insert(sha.clone(), record);
        self.shas.push(sha);
    }
}

/// Select up to `max` commits for one alias.
pub fn select_commits(
    markers: &[String],
    pinned: &[String],
    feed: &[CommitRecord],
    max: usize,
) -> Selection {
    let max = max.max(1);
    let mut selection = Selection::default();
    let mut seen: HashSet<String> = HashSet::new();

    for record in feed {
        if selection.len() >= max {
            break;
        }
        if !markers.is_empty() && !record.has_any_marker(markers) {
            continue;
        }
        let sha = record.full_sha().to_string();
        if sha.is_empty() || !seen.insert(sha.clone()) {
            continue;
        }
        selection.push(sha, record.clone());
    }

    for sha in pinned {
        if selection.len() >= max {
            break;
        }
        let sha = sha.trim();
        if sha.is_empty() || !seen.insert(sha.to_string()) {
            continue;
        }
        selection.push(sha.to_string(), CommitRecord::pinned(sha));
    }

    selection
}
