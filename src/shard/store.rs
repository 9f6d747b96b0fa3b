//! Session cache of loaded shards.
//!
//! The store is the only shared mutable state in the engine:
//! - loaded shards are cached for the session, per published version
//! - concurrent loads of one shard share a single in-flight future
//! - failed loads are remembered for a short window so typing doesn't hammer
//!   a broken shard on every keystroke

use crate::config::SearchConfig;
use crate::error::ShardError;
use crate::shard::format::{Shard, parse_manifest, parse_shard};
use crate::shard::partition::PartitionTable;
use crate::shard::source::ShardSource;
use crate::types::ShardId;
use ahash::AHashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};

/// Type alias for shared shard load futures.
type SharedShardFuture = Shared<BoxFuture<'static, Result<Arc<Shard>, ShardError>>>;

/// A load in progress, tagged with the manifest version it started under.
struct InFlight {
    future: SharedShardFuture,
    version: u64,
}

/// A remembered load failure.
struct Failure {
    at: Instant,
    error: ShardError,
}

/// Loads shards on demand and caches them for the session.
///
/// Explicitly constructed and injected into the engine, so every test can use
/// its own isolated instance.
pub struct ShardStore {
    source: Arc<dyn ShardSource>,

    /// Current partition table (manifest)
    partitions: RwLock<PartitionTable>,

    /// Loaded shards for the current version
    cache: RwLock<AHashMap<ShardId, Arc<Shard>>>,

    /// In-flight loads (can be awaited by multiple callers)
    in_flight: Mutex<AHashMap<ShardId, InFlight>>,

    /// Negative cache of recent failures
    failures: Mutex<AHashMap<ShardId, Failure>>,

    negative_cache_ttl: Duration,
    load_timeout: Duration,
}

impl std::fmt::Debug for ShardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardStore")
            .field("version", &self.partitions.try_read().ok().map(|p| p.version))
            .field("cache_size", &self.cache.try_read().ok().map(|c| c.len()))
            .field("in_flight_count", &self.in_flight.try_lock().ok().map(|m| m.len()))
            .field("negative_cache_ttl", &self.negative_cache_ttl)
            .field("load_timeout", &self.load_timeout)
            .finish_non_exhaustive()
    }
}

impl ShardStore {
    /// Create a store over a known partition table.
    pub fn with_partitions(
        source: Arc<dyn ShardSource>,
        partitions: PartitionTable,
        config: &SearchConfig,
    ) -> Self {
        Self {
            source,
            partitions: RwLock::new(partitions),
            cache: RwLock::new(AHashMap::new()),
            in_flight: Mutex::new(AHashMap::new()),
            failures: Mutex::new(AHashMap::new()),
            negative_cache_ttl: config.negative_cache_ttl(),
            load_timeout: config.load_timeout(),
        }
    }

    /// Create a store by fetching the manifest from `source`.
    pub async fn open(source: Arc<dyn ShardSource>, config: &SearchConfig) -> Result<Self, ShardError> {
        let manifest = source.fetch_manifest().await?;
        let partitions = parse_manifest(&manifest)?;
        tracing::info!(
            "Opened shard store: version {}, {} shards",
            partitions.version,
            partitions.len()
        );
        Ok(Self::with_partitions(source, partitions, config))
    }

    /// Maps a normalized 1–2 character prefix to its partition.
    pub fn shard_id_for(prefix: &str) -> Option<ShardId> {
        PartitionTable::shard_id_for(prefix)
    }

    /// The shards a normalized query must consult under the current table.
    pub async fn shards_for(&self, query: &str) -> Vec<ShardId> {
        self.partitions.read().await.shards_for(query)
    }

    /// Get the current partition table.
    pub async fn partitions(&self) -> PartitionTable {
        self.partitions.read().await.clone()
    }

    pub async fn version(&self) -> u64 {
        self.partitions.read().await.version
    }

    /// Install a newly published partition table.
    ///
    /// A different version replaces the whole session cache: cached shards,
    /// remembered failures and in-flight loads are all dropped. Loads already
    /// running for the old version still answer their callers but are not cached.
    pub async fn publish(&self, table: PartitionTable) {
        let mut in_flight = self.in_flight.lock().await;
        let mut partitions = self.partitions.write().await;

        if partitions.version != table.version {
            let mut cache = self.cache.write().await;
            let dropped = cache.len();
            cache.clear();
            self.failures.lock().await.clear();
            in_flight.clear();

            tracing::info!(
                "Published shard build version {} -> {} ({} shards, dropped {} cached)",
                partitions.version,
                table.version,
                table.len(),
                dropped
            );
        }

        *partitions = table;
    }

    /// Re-read the manifest from the source and publish it.
    pub async fn refresh(&self) -> Result<u64, ShardError> {
        let manifest = self.source.fetch_manifest().await?;
        let table = parse_manifest(&manifest)?;
        let version = table.version;
        self.publish(table).await;
        Ok(version)
    }

    /// Get a shard, loading it if needed.
    ///
    /// This is the main entry point for the query engine. It:
    /// 1. Checks the cache
    /// 2. Fails fast if the shard failed within the negative-cache window
    /// 3. Joins an in-flight load, or starts one
    pub async fn ensure_loaded(&self, id: &ShardId) -> Result<Arc<Shard>, ShardError> {
        // 1. Check cache first
        if let Some(shard) = self.cache.read().await.get(id) {
            tracing::debug!("Cache hit for shard '{}'", id);
            return Ok(shard.clone());
        }

        let (future, version) = {
            let mut in_flight = self.in_flight.lock().await;

            // A load may have completed while we waited for the lock
            if let Some(shard) = self.cache.read().await.get(id) {
                return Ok(shard.clone());
            }

            // 2. Negative cache
            if let Some(error) = self.recent_failure(id).await {
                tracing::debug!("Shard '{}' failed recently, not retrying yet", id);
                return Err(error);
            }

            // 3. Join or start
            if let Some(load) = in_flight.get(id) {
                tracing::debug!("Awaiting in-flight load for shard '{}'", id);
                (load.future.clone(), load.version)
            } else {
                let version = self.partitions.read().await.version;
                let future = self.start_load(id, version).shared();
                in_flight.insert(
                    id.clone(),
                    InFlight {
                        future: future.clone(),
                        version,
                    },
                );
                tracing::debug!("Starting load for shard '{}' (version {})", id, version);
                (future, version)
            }
        };

        let result = future.await;
        self.complete(id, version, &result).await;
        result
    }

    /// Check if a shard is cached.
    pub async fn is_cached(&self, id: &ShardId) -> bool {
        self.cache.read().await.contains_key(id)
    }

    /// Check if a load is in progress for a shard.
    pub async fn is_loading(&self, id: &ShardId) -> bool {
        self.in_flight.lock().await.contains_key(id)
    }

    /// Get a cached shard without triggering a load.
    pub async fn cached(&self, id: &ShardId) -> Option<Arc<Shard>> {
        self.cache.read().await.get(id).cloned()
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Builds the load future: fetch, parse on a blocking thread, all under the timeout.
    fn start_load(&self, id: &ShardId, version: u64) -> BoxFuture<'static, Result<Arc<Shard>, ShardError>> {
        let fetch = self.source.fetch_shard(id);
        let timeout = self.load_timeout;
        let id = id.clone();

        async move {
            let start = Instant::now();
            let load = async {
                let bytes = fetch.await?;
                let parse_id = id.clone();
                tokio::task::spawn_blocking(move || parse_shard(&parse_id, version, &bytes))
                    .await
                    .map_err(|e| ShardError::Parse {
                        shard: id.clone(),
                        reason: format!("parse task failed: {}", e),
                    })?
            };

            let shard = tokio::time::timeout(timeout, load)
                .await
                .map_err(|_| ShardError::Timeout {
                    shard: id.clone(),
                    millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })??;

            tracing::info!(
                "Loaded shard '{}' ({} entries) in {:?}",
                id,
                shard.len(),
                start.elapsed()
            );
            Ok(Arc::new(shard))
        }
        .boxed()
    }

    /// Records a finished load. Every awaiter calls this; the writes are idempotent.
    async fn complete(&self, id: &ShardId, version: u64, result: &Result<Arc<Shard>, ShardError>) {
        // Held until the result is recorded; publish must not run in between
        let partitions = self.partitions.read().await;
        let current = partitions.version;

        if version == current {
            match result {
                Ok(shard) => {
                    self.cache.write().await.insert(id.clone(), shard.clone());
                    self.failures.lock().await.remove(id);
                }
                Err(error) => {
                    tracing::warn!("Shard '{}' unavailable: {}", id, error);
                    self.failures.lock().await.insert(
                        id.clone(),
                        Failure {
                            at: Instant::now(),
                            error: error.clone(),
                        },
                    );
                }
            }
        } else {
            tracing::debug!(
                "Discarding shard '{}' loaded for stale version {} (current {})",
                id,
                version,
                current
            );
        }
        drop(partitions);

        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(id).is_some_and(|load| load.version == version) {
            in_flight.remove(id);
        }
    }

    /// A failure younger than the negative-cache window, if any. Expired entries are dropped.
    async fn recent_failure(&self, id: &ShardId) -> Option<ShardError> {
        let mut failures = self.failures.lock().await;
        let failure = failures.get(id)?;
        if failure.at.elapsed() < self.negative_cache_ttl {
            return Some(failure.error.clone());
        }
        failures.remove(id);
        None
    }
}
