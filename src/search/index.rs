//! Per-shard index snapshots with bucketed prefix lookup.

use crate::shard::Shard;
use crate::shard::format::entry_order;
use crate::types::{Entry, ShardId};
use ahash::AHashMap;
use std::ops::Range;
use std::sync::Arc;

/// Longest key prefix that gets its own bucket.
pub const BUCKET_DEPTH: usize = 3;

/// Immutable, sorted view of one shard plus a prefix → range map.
///
/// Entries sharing a key prefix are contiguous in key order, so each bucket is
/// a single range. Queries up to [`BUCKET_DEPTH`] characters are answered by a
/// map lookup; longer ones binary-search inside their bucket.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    shard: ShardId,
    fingerprint: u64,
    entries: Vec<Arc<Entry>>,
    buckets: AHashMap<String, Range<usize>>,
}

impl IndexSnapshot {
    /// Builds the snapshot for a shard. Pure function of the shard's entries.
    pub fn build(shard: &Shard) -> Self {
        let start = std::time::Instant::now();
        let mut entries = shard.entries().to_vec();
        if !entries.is_sorted_by(|a, b| entry_order(a, b).is_le()) {
            entries.sort_by(|a, b| entry_order(a, b));
        }

        let mut buckets: AHashMap<String, Range<usize>> = AHashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            let key = entry.key();
            for depth in 1..=BUCKET_DEPTH.min(key.len()) {
                let Some(prefix) = key.get(..depth) else {
                    break;
                };
                buckets
                    .entry(prefix.to_string())
                    .and_modify(|range| range.end = index + 1)
                    .or_insert(index..index + 1);
            }
        }

        tracing::debug!(
            "Built index snapshot for shard '{}': {} entries, {} buckets in {:?}",
            shard.id(),
            entries.len(),
            buckets.len(),
            start.elapsed()
        );

        Self {
            shard: shard.id().clone(),
            fingerprint: shard.fingerprint(),
            entries,
            buckets,
        }
    }

    pub const fn shard(&self) -> &ShardId {
        &self.shard
    }

    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose key starts with `query`, in key order.
    ///
    /// Calling again with the same query yields the same sequence.
    pub fn match_prefix<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a Arc<Entry>> + 'a {
        self.entries[self.prefix_range(query)].iter()
    }

    /// Entries whose key contains `query` anywhere, in key order.
    ///
    /// Linear scan; the engine only uses it when prefix matching comes up short.
    pub fn match_contains<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a Arc<Entry>> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.key().contains(query))
    }

    fn prefix_range(&self, query: &str) -> Range<usize> {
        if query.is_empty() {
            return 0..self.entries.len();
        }
        if query.len() <= BUCKET_DEPTH {
            return self.buckets.get(query).cloned().unwrap_or(0..0);
        }

        let bucket = query
            .get(..BUCKET_DEPTH)
            .and_then(|head| self.buckets.get(head))
            .cloned()
            .unwrap_or(0..0);
        let slice = &self.entries[bucket.clone()];

        let lo = slice.partition_point(|e| e.key() < query);
        let hi = lo + slice[lo..].partition_point(|e| e.key().starts_with(query));
        bucket.start + lo..bucket.start + hi
    }
}
