//! Shard file codec: JSON entry tables, the manifest, and the decoded [`Shard`].

use crate::error::ShardError;
use crate::shard::partition::PartitionTable;
use crate::types::{Entry, EntryKind, ShardId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// File name of the partition table inside a shard directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of a shard inside a shard directory.
pub fn shard_file_name(id: &ShardId) -> String {
    format!("{}.json", id)
}

/// One persisted entry. The key is derived on load, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardRecord {
    pub display_name: String,
    pub target_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope_label: String,
    pub kind: EntryKind,
}

impl From<&Entry> for ShardRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            display_name: entry.display_name().to_string(),
            target_url: entry.target_url().to_string(),
            scope_label: entry.scope_label().to_string(),
            kind: entry.kind(),
        }
    }
}

/// An immutable, loaded partition of the entry set.
#[derive(Debug)]
pub struct Shard {
    id: ShardId,
    version: u64,
    fingerprint: u64,
    entries: Vec<Arc<Entry>>,
}

impl Shard {
    /// Assembles a shard from entries, sorting them into canonical order.
    pub fn new(id: ShardId, version: u64, fingerprint: u64, mut entries: Vec<Arc<Entry>>) -> Self {
        entries.sort_by(|a, b| entry_order(a, b));
        Self {
            id,
            version,
            fingerprint,
            entries,
        }
    }

    pub const fn id(&self) -> &ShardId {
        &self.id
    }

    /// Manifest version the shard was loaded under.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// xxh3 of the raw shard bytes; equal fingerprints mean identical content.
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Entries ordered by key, then display name, then target url.
    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical in-shard order.
pub(crate) fn entry_order(a: &Entry, b: &Entry) -> std::cmp::Ordering {
    a.key()
        .cmp(b.key())
        .then_with(|| a.display_name().cmp(b.display_name()))
        .then_with(|| a.target_url().cmp(b.target_url()))
}

/// Decodes a shard file.
///
/// Every record must produce a valid entry whose key belongs to `id`.
pub fn parse_shard(id: &ShardId, version: u64, bytes: &[u8]) -> Result<Shard, ShardError> {
    let parse_error = |reason: String| ShardError::Parse {
        shard: id.clone(),
        reason,
    };

    let records: Vec<ShardRecord> =
        serde_json::from_slice(bytes).map_err(|e| parse_error(e.to_string()))?;

    let mut entries = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let entry = Entry::new(
            record.display_name,
            record.target_url,
            record.scope_label,
            record.kind,
        )
        .map_err(|e| parse_error(format!("record {}: {}", position, e)))?;

        if entry.shard_id() != *id {
            return Err(parse_error(format!(
                "record {}: '{}' belongs to shard '{}'",
                position,
                entry.display_name(),
                entry.shard_id()
            )));
        }
        entries.push(Arc::new(entry));
    }

    Ok(Shard::new(id.clone(), version, xxh3_64(bytes), entries))
}

/// Encodes entries as a shard file body.
pub fn encode_shard<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> serde_json::Result<Vec<u8>> {
    let records: Vec<ShardRecord> = entries.into_iter().map(ShardRecord::from).collect();
    serde_json::to_vec(&records)
}

/// Decodes `manifest.json`. A broken manifest surfaces as a parse error on the
/// manifest's own name since it is not tied to any one shard.
///
/// Every listed id must be well formed, since ids become file names.
pub fn parse_manifest(bytes: &[u8]) -> Result<PartitionTable, ShardError> {
    let manifest_error = |reason: String| ShardError::Parse {
        shard: ShardId::new_unchecked(MANIFEST_FILE),
        reason,
    };

    let table: PartitionTable =
        serde_json::from_slice(bytes).map_err(|e| manifest_error(e.to_string()))?;
    if let Some(bad) = table.iter().find(|id| !id.is_well_formed()) {
        return Err(manifest_error(format!("invalid shard id '{}'", bad)));
    }
    Ok(table)
}
