//! Shard storage: partitioning, file formats, sources and the session cache.

pub mod build;
pub mod doxygen;
pub mod format;
pub mod partition;
pub mod source;
pub mod store;

pub use build::{BuiltShards, ShardBuilder};
pub use format::{Shard, ShardRecord};
pub use partition::PartitionTable;
pub use source::{DirectorySource, MemorySource, ShardSource};
pub use store::ShardStore;
