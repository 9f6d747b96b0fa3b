//! Sharded symbol search for API documentation sites.
//!
//! Entries (classes, namespaces, typedefs, ...) are partitioned into small shards
//! by the first characters of their normalized name. A [`QueryEngine`] loads only
//! the shards a query needs through a shared [`ShardStore`], matches prefixes
//! against per-shard index snapshots, ranks the results and hands them out
//! through a cancellable [`ResultCursor`].

pub mod config;
pub mod error;
pub mod search;
pub mod shard;
pub mod tracing;
pub mod types;

pub use config::SearchConfig;
pub use error::{EntryError, SearchError, ShardError};
pub use search::{Page, QueryEngine, QueryState, ResultCursor, SearchHandle, Suggestion};
pub use shard::{DirectorySource, MemorySource, PartitionTable, ShardBuilder, ShardSource, ShardStore};
pub use types::{Entry, EntryKind, ShardId, normalize_key};
