//! Shared test fixtures and utilities for integration tests.
//!
//! # Test Isolation Strategy
//!
//! Every fixture builds its own shard set, store and engine, so tests never share
//! a session cache. Each test gets:
//! - Shards built from the Doxygen excerpts under `tests/fixtures/search`
//! - A fresh [`MemorySource`] handle for failure injection and fetch counting
//! - An empty store cache (cold state)
//!
//! # Available Fixtures
//!
//! - `isolated_engine`: engine over an in-memory source (recommended)
//! - `slow_engine`: same data, every fetch delayed by [`SLOW_FETCH`]
//! - `fixture_entries`: the imported entries, for tests that build their own layout
//!
//! # Shared Infrastructure
//!
//! [`TempShardDir`] provides a temp directory for tests that publish shards to
//! disk and read them back through a `DirectorySource`.

use rstest::fixture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use symdex::shard::doxygen::import_file;
use symdex::{Entry, MemorySource, QueryEngine, SearchConfig, ShardBuilder, ShardId, ShardStore};
use tempfile::TempDir;

/// Version stamped on shards built by the fixtures.
#[allow(dead_code)]
pub const FIXTURE_VERSION: u64 = 1;

/// Fetch latency used by `slow_engine`; long enough to interleave searches.
#[allow(dead_code)]
pub const SLOW_FETCH: Duration = Duration::from_millis(150);

/// Returns the directory holding the Doxygen search excerpts.
pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/search")
}

/// Shorthand for building shard ids in assertions.
#[allow(dead_code)]
pub fn shard(name: &str) -> ShardId {
    ShardId::new_unchecked(name)
}

/// Imports every fixture file, in file name order.
pub async fn load_fixture_entries() -> Vec<Entry> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(fixture_dir())
        .expect("Failed to read fixture directory")
        .map(|e| e.expect("Failed to read fixture entry").path())
        .collect();
    paths.sort();

    let mut entries = Vec::new();
    for path in paths {
        let imported = import_file(&path)
            .await
            .unwrap_or_else(|e| panic!("Failed to import '{}': {:#}", path.display(), e));
        entries.extend(imported);
    }
    entries
}

/// A temporary directory for published shard sets.
///
/// Cleaned up automatically when dropped.
#[allow(dead_code)] // Methods used across different integration test crates
pub struct TempShardDir {
    _temp: TempDir,
    root: PathBuf,
}

#[allow(dead_code)] // Methods used across different integration test crates
impl TempShardDir {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let root = temp.path().to_path_buf();
        Self { _temp: temp, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Overwrites a file within this directory.
    ///
    /// # Panics
    /// Panics if the write fails.
    pub fn write_file(&self, name: &str, content: &[u8]) {
        std::fs::write(self.root.join(name), content)
            .unwrap_or_else(|e| panic!("Failed to write file '{}': {}", name, e));
    }
}

impl Default for TempShardDir {
    fn default() -> Self {
        Self::new()
    }
}

/// An engine plus the source it reads from.
///
/// The source handle shares state with the one inside the store, so tests can
/// inject failures and count fetches after the engine is built.
#[allow(dead_code)] // Fields used across different integration test crates
pub struct IsolatedEngine {
    pub engine: QueryEngine,
    pub source: MemorySource,
}

#[allow(dead_code)] // Methods used across different integration test crates
impl IsolatedEngine {
    pub fn new() -> Self {
        Self::with_config(SearchConfig::default(), None)
    }

    /// Builds the fixture shards and opens an engine over them.
    ///
    /// Must be called from a multi-threaded runtime.
    pub fn with_config(config: SearchConfig, latency: Option<Duration>) -> Self {
        symdex::tracing::init();
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let mut builder = ShardBuilder::new();
                builder.extend(load_fixture_entries().await);
                let mut source = builder
                    .build(FIXTURE_VERSION)
                    .into_memory_source()
                    .expect("Failed to build fixture shards");
                if let Some(latency) = latency {
                    source = source.with_latency(latency);
                }

                let store = ShardStore::open(Arc::new(source.clone()), &config)
                    .await
                    .expect("Failed to open fixture store");
                Self {
                    engine: QueryEngine::new(Arc::new(store), config),
                    source,
                }
            })
        })
    }

    pub fn store(&self) -> &Arc<ShardStore> {
        self.engine.store()
    }
}

impl Default for IsolatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Display names of every remaining result, draining the cursor.
#[allow(dead_code)]
pub fn drain_names(cursor: &mut symdex::ResultCursor) -> Vec<String> {
    cursor
        .next(usize::MAX)
        .expect("cursor should not be cancelled")
        .entries
        .iter()
        .map(|e| e.display_name().to_string())
        .collect()
}

/// Creates an isolated engine over the fixture shards.
///
/// This is the **recommended fixture**. Tests using it can run in parallel
/// without interference.
#[fixture]
pub fn isolated_engine() -> IsolatedEngine {
    IsolatedEngine::new()
}

/// Same as `isolated_engine`, but every shard fetch takes [`SLOW_FETCH`].
#[fixture]
pub fn slow_engine() -> IsolatedEngine {
    IsolatedEngine::with_config(SearchConfig::default(), Some(SLOW_FETCH))
}

/// The imported fixture entries.
#[fixture]
pub fn fixture_entries() -> Vec<Entry> {
    symdex::tracing::init();
    tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(load_fixture_entries())
    })
}
