//! The versioned partition table shared by the shard build step and the store.

use crate::types::ShardId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which shards a published build contains.
///
/// Serialized as the shard directory's `manifest.json`. A new `version` means the
/// build was regenerated and every cached shard must be replaced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartitionTable {
    pub version: u64,
    pub shards: BTreeSet<ShardId>,
}

impl PartitionTable {
    pub fn new(version: u64, shards: impl IntoIterator<Item = ShardId>) -> Self {
        Self {
            version,
            shards: shards.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &ShardId) -> bool {
        self.shards.contains(id)
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShardId> {
        self.shards.iter()
    }

    /// Maps a normalized 1–2 character prefix to the partition that owns it.
    ///
    /// Longer input is truncated to its first two characters. For a single letter
    /// this names only the `<letter>_` bucket; use [`Self::shards_for`] to get
    /// every shard a one-character query touches.
    pub fn shard_id_for(prefix: &str) -> Option<ShardId> {
        let head: String = prefix.chars().take(2).collect();
        ShardId::for_key(&head)
    }

    /// The listed shards a normalized query has to consult, sorted.
    ///
    /// One-letter queries fan out to every shard starting with that letter;
    /// everything else resolves to at most one shard.
    pub fn shards_for(&self, query: &str) -> Vec<ShardId> {
        let mut chars = query.chars();
        let Some(first) = chars.next() else {
            return vec![];
        };

        if first.is_ascii_lowercase() && chars.next().is_none() {
            return self
                .shards
                .iter()
                .filter(|id| id.as_str().starts_with(first))
                .cloned()
                .collect();
        }

        Self::shard_id_for(query)
            .filter(|id| self.contains(id))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use rstest::{fixture, rstest};

    #[fixture]
    fn table() -> PartitionTable {
        PartitionTable::new(
            1,
            ["_", "a_", "ab", "ac", "bo", "pe", "pa", "p2"]
                .into_iter()
                .map(ShardId::new_unchecked),
        )
    }

    fn ids(ids: &[ShardId]) -> Vec<&str> {
        ids.iter().map(ShardId::as_str).collect()
    }

    #[rstest]
    #[case("pe", Some("pe"))]
    #[case("peerfinder", Some("pe"))]
    #[case("p", Some("p_"))]
    #[case("9", Some("_"))]
    #[case("", None)]
    fn test_shard_id_for(#[case] prefix: &str, #[case] expected: Option<&str>) {
        check!(PartitionTable::shard_id_for(prefix).as_ref().map(ShardId::as_str) == expected);
    }

    #[rstest]
    fn test_single_letter_fans_out(table: PartitionTable) {
        check!(ids(&table.shards_for("p")) == vec!["p2", "pa", "pe"]);
        check!(ids(&table.shards_for("a")) == vec!["a_", "ab", "ac"]);
    }

    #[rstest]
    fn test_longer_query_hits_one_shard(table: PartitionTable) {
        check!(ids(&table.shards_for("peer")) == vec!["pe"]);
        check!(ids(&table.shards_for("bo")) == vec!["bo"]);
    }

    #[rstest]
    fn test_unlisted_shard_resolves_to_nothing(table: PartitionTable) {
        check!(table.shards_for("zz").is_empty());
        check!(table.shards_for("q").is_empty());
        check!(table.shards_for("").is_empty());
    }

    #[rstest]
    fn test_digits_and_underscore_use_catch_all(table: PartitionTable) {
        check!(ids(&table.shards_for("2")) == vec!["_"]);
        check!(ids(&table.shards_for("_impl")) == vec!["_"]);
    }

    #[test]
    fn test_manifest_json_shape() {
        let table = PartitionTable::new(7, [ShardId::new_unchecked("pe")]);
        let json = serde_json::to_string(&table).unwrap();
        check!(json == r#"{"version":7,"shards":["pe"]}"#);
    }
}
