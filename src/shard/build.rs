//! Partitioning entries into shards and publishing a shard directory.

use crate::error::Result;
use crate::shard::format::{MANIFEST_FILE, encode_shard, entry_order, shard_file_name};
use crate::shard::partition::PartitionTable;
use crate::shard::source::MemorySource;
use crate::types::{Entry, ShardId};
use anyhow::Context;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Collects entries and splits them by [`ShardId::for_key`].
#[derive(Debug, Default)]
pub struct ShardBuilder {
    entries: Vec<Entry>,
}

impl ShardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: Entry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = Entry>) -> &mut Self {
        self.entries.extend(entries);
        self
    }

    /// Sorts and partitions everything added so far.
    ///
    /// Entries repeating an earlier `(key, target_url)` pair are dropped.
    pub fn build(self, version: u64) -> BuiltShards {
        let mut shards: BTreeMap<ShardId, Vec<Entry>> = BTreeMap::new();
        for entry in self.entries {
            shards.entry(entry.shard_id()).or_default().push(entry);
        }

        let mut dropped = 0usize;
        for entries in shards.values_mut() {
            entries.sort_by(entry_order);
            let mut seen = HashSet::new();
            let before = entries.len();
            entries.retain(|e| seen.insert((e.key().to_string(), e.target_url().to_string())));
            dropped += before - entries.len();
        }

        if dropped > 0 {
            tracing::debug!("Dropped {} duplicate entries while building shards", dropped);
        }

        BuiltShards {
            table: PartitionTable::new(version, shards.keys().cloned()),
            shards,
        }
    }
}

/// Output of [`ShardBuilder::build`]: a partition table plus sorted shard contents.
#[derive(Debug)]
pub struct BuiltShards {
    table: PartitionTable,
    shards: BTreeMap<ShardId, Vec<Entry>>,
}

impl BuiltShards {
    pub const fn table(&self) -> &PartitionTable {
        &self.table
    }

    pub fn entries(&self, id: &ShardId) -> &[Entry] {
        self.shards.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry_count(&self) -> usize {
        self.shards.values().map(Vec::len).sum()
    }

    /// Writes `manifest.json` and one `<id>.json` per shard into `dir`.
    ///
    /// Shards are written before the manifest so a reader never sees a manifest
    /// naming missing shards.
    pub async fn write_to(&self, dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        for (id, entries) in &self.shards {
            let path = dir.join(shard_file_name(id));
            let bytes = encode_shard(entries).with_context(|| format!("Failed to encode shard '{}'", id))?;
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("Failed to write shard to {}", path.display()))?;
        }

        let manifest = serde_json::to_vec_pretty(&self.table).context("Failed to serialize manifest")?;
        let path = dir.join(MANIFEST_FILE);
        tokio::fs::write(&path, manifest)
            .await
            .with_context(|| format!("Failed to write manifest to {}", path.display()))?;

        tracing::info!(
            "Wrote {} shards ({} entries, version {}) to {}",
            self.shards.len(),
            self.entry_count(),
            self.table.version,
            dir.display()
        );
        Ok(())
    }

    /// Serves the built shards from memory.
    pub fn into_memory_source(self) -> Result<MemorySource> {
        let source = MemorySource::new();
        source.set_manifest(serde_json::to_vec(&self.table).context("Failed to serialize manifest")?);
        for (id, entries) in &self.shards {
            let bytes = encode_shard(entries).with_context(|| format!("Failed to encode shard '{}'", id))?;
            source.insert_shard(id.clone(), bytes);
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::format::{parse_manifest, parse_shard};
    use crate::shard::source::{DirectorySource, ShardSource};
    use crate::types::EntryKind;
    use assert2::check;

    fn entry(name: &str, url: &str) -> Entry {
        Entry::new(name, url, "ripple", EntryKind::Class).unwrap()
    }

    fn sample() -> ShardBuilder {
        let mut builder = ShardBuilder::new();
        builder
            .add(entry("PeerImp", "../classripple_1_1PeerImp.html"))
            .add(entry("Peer", "../classripple_1_1Peer.html"))
            .add(entry("Book", "../classripple_1_1Book.html"))
            .add(entry("Peer", "../classripple_1_1Peer.html"))
            .add(entry("base64", "../namespaceripple_1_1base64.html"))
            .add(entry("2fa", "../a.html"));
        builder
    }

    #[test]
    fn test_build_partitions_and_dedups() {
        let built = sample().build(4);
        let ids: Vec<&str> = built.table().iter().map(ShardId::as_str).collect();
        check!(ids == vec!["_", "ba", "bo", "pe"]);
        check!(built.table().version == 4);

        let pe = built.entries(&ShardId::new_unchecked("pe"));
        let names: Vec<&str> = pe.iter().map(Entry::display_name).collect();
        check!(names == vec!["Peer", "PeerImp"]);
        check!(built.entry_count() == 5);
    }

    #[tokio::test]
    async fn test_write_to_directory_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        sample().build(2).write_to(dir.path()).await.unwrap();

        let source = DirectorySource::new(dir.path());
        let table = parse_manifest(&source.fetch_manifest().await.unwrap()).unwrap();
        check!(table.len() == 4);

        let id = ShardId::new_unchecked("pe");
        let bytes = source.fetch_shard(&id).await.unwrap();
        let shard = parse_shard(&id, table.version, &bytes).unwrap();
        check!(shard.len() == 2);
    }

    #[tokio::test]
    async fn test_into_memory_source() {
        let source = sample().build(1).into_memory_source().unwrap();
        let bytes = source.fetch_shard(&ShardId::new_unchecked("bo")).await.unwrap();
        let shard = parse_shard(&ShardId::new_unchecked("bo"), 1, &bytes).unwrap();
        check!(shard.entries()[0].display_name() == "Book");
    }
}
