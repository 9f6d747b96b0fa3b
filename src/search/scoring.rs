//! Result ranking and deduplication.

use crate::types::Entry;
use ahash::AHashSet;
use std::cmp::Ordering;
use std::sync::Arc;

/// Total order over matches for a normalized query.
///
/// In priority order:
/// 1. exact key match
/// 2. shorter display name (more specific)
/// 3. kind priority (namespaces and classes, then functions, typedefs, external references)
/// 4. display name, alphabetical
///
/// Target url and scope label break any remaining tie so the order is total.
pub fn compare_matches(query: &str, a: &Entry, b: &Entry) -> Ordering {
    let inexact = |e: &Entry| e.key() != query;

    inexact(a)
        .cmp(&inexact(b))
        .then_with(|| {
            a.display_name()
                .chars()
                .count()
                .cmp(&b.display_name().chars().count())
        })
        .then_with(|| a.kind().priority().cmp(&b.kind().priority()))
        .then_with(|| a.display_name().cmp(b.display_name()))
        .then_with(|| a.target_url().cmp(b.target_url()))
        .then_with(|| a.scope_label().cmp(b.scope_label()))
}

/// Sorts matches and drops repeats of a `(key, target_url)` pair, keeping the best-ranked.
pub fn rank(query: &str, mut matches: Vec<Arc<Entry>>) -> Vec<Arc<Entry>> {
    matches.sort_by(|a, b| compare_matches(query, a, b));

    let mut seen: AHashSet<(String, String)> = AHashSet::with_capacity(matches.len());
    matches
        .into_iter()
        .filter(|e| seen.insert((e.key().to_string(), e.target_url().to_string())))
        .collect()
}
