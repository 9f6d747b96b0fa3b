//! Error handling types and utilities.

use crate::types::ShardId;
use thiserror::Error;

/// A specialized Result type for tooling paths (config, import, shard building).
///
/// This is an alias for `anyhow::Result` with context added via `.context()` and
/// `.with_context()` methods. The query path uses the typed errors below instead.
pub type Result<T> = anyhow::Result<T>;

/// Rejected entry records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("entry '{display_name}' has an empty target url")]
    EmptyTargetUrl { display_name: String },
    #[error("entry '{display_name}' normalizes to an empty key")]
    EmptyKey { display_name: String },
}

/// Why a single shard could not be made available.
///
/// `Clone` because one failed load is handed to every caller awaiting the same
/// in-flight future.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardError {
    /// The source has no file for this shard.
    #[error("shard '{shard}' not found")]
    NotFound { shard: ShardId },
    /// Reading the shard bytes failed.
    #[error("failed to fetch shard '{shard}': {reason}")]
    Fetch { shard: ShardId, reason: String },
    /// The shard bytes are not a valid entry table.
    #[error("failed to parse shard '{shard}': {reason}")]
    Parse { shard: ShardId, reason: String },
    /// The load did not finish within the configured timeout.
    #[error("loading shard '{shard}' timed out after {millis}ms")]
    Timeout { shard: ShardId, millis: u64 },
}

impl ShardError {
    /// The shard this error is about.
    pub const fn shard(&self) -> &ShardId {
        match self {
            Self::NotFound { shard }
            | Self::Fetch { shard, .. }
            | Self::Parse { shard, .. }
            | Self::Timeout { shard, .. } => shard,
        }
    }
}

/// Errors that cross the query boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// One shard failed. Absorbed by the engine, surfaced by lower-level callers.
    #[error("shard '{shard}' unavailable: {source}")]
    ShardUnavailable {
        shard: ShardId,
        #[source]
        source: ShardError,
    },
    /// Every shard the query needed failed to load.
    #[error("search unavailable: no shard could be loaded ({})", join_ids(.shards))]
    SearchUnavailable { shards: Vec<ShardId> },
    /// The search was superseded or explicitly cancelled.
    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    /// Cancellation is expected during typeahead; callers should just drop the result.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ShardError> for SearchError {
    fn from(source: ShardError) -> Self {
        Self::ShardUnavailable {
            shard: source.shard().clone(),
            source,
        }
    }
}

fn join_ids(ids: &[ShardId]) -> String {
    ids.iter()
        .map(ShardId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
