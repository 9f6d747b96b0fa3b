//! Where shard bytes come from.
//!
//! The store only talks to a [`ShardSource`]; the build step decides the layout.
//! [`DirectorySource`] serves a published shard directory, [`MemorySource`]
//! serves bytes held in memory (embedding, tests).

use crate::error::ShardError;
use crate::shard::format::{MANIFEST_FILE, shard_file_name};
use crate::types::ShardId;
use ahash::AHashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fetches raw manifest and shard bytes.
///
/// Futures are `'static` so the store can share one in-flight load between callers.
pub trait ShardSource: Send + Sync {
    fn fetch_manifest(&self) -> BoxFuture<'static, Result<Vec<u8>, ShardError>>;

    fn fetch_shard(&self, id: &ShardId) -> BoxFuture<'static, Result<Vec<u8>, ShardError>>;
}

/// Reads `manifest.json` and `<id>.json` files from a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn read(&self, file_name: String, id: ShardId) -> BoxFuture<'static, Result<Vec<u8>, ShardError>> {
        let path = self.root.join(file_name);
        async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(ShardError::NotFound { shard: id })
                }
                Err(e) => Err(ShardError::Fetch {
                    shard: id,
                    reason: format!("{}: {}", path.display(), e),
                }),
            }
        }
        .boxed()
    }
}

impl ShardSource for DirectorySource {
    fn fetch_manifest(&self) -> BoxFuture<'static, Result<Vec<u8>, ShardError>> {
        self.read(
            MANIFEST_FILE.to_string(),
            ShardId::new_unchecked(MANIFEST_FILE),
        )
    }

    fn fetch_shard(&self, id: &ShardId) -> BoxFuture<'static, Result<Vec<u8>, ShardError>> {
        if !id.is_well_formed() {
            let error = ShardError::NotFound { shard: id.clone() };
            return async move { Err(error) }.boxed();
        }
        self.read(shard_file_name(id), id.clone())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    manifest: Mutex<Vec<u8>>,
    shards: Mutex<AHashMap<ShardId, Vec<u8>>>,
    failing: Mutex<HashSet<ShardId>>,
    fetches: Mutex<AHashMap<ShardId, usize>>,
    total_fetches: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

/// Serves shard bytes from memory.
///
/// Cloning shares the underlying data, so a test can keep a handle for failure
/// injection and fetch counting after handing the source to a store.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<MemoryInner>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_manifest(&self, bytes: Vec<u8>) {
        *lock(&self.inner.manifest) = bytes;
    }

    pub fn insert_shard(&self, id: ShardId, bytes: Vec<u8>) {
        lock(&self.inner.shards).insert(id, bytes);
    }

    /// Makes every fetch of `id` fail until [`Self::heal_shard`].
    pub fn fail_shard(&self, id: &ShardId) {
        lock(&self.inner.failing).insert(id.clone());
    }

    pub fn heal_shard(&self, id: &ShardId) {
        lock(&self.inner.failing).remove(id);
    }

    /// Delays every fetch, to widen race windows in concurrency tests.
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.inner.latency) = Some(latency);
        self
    }

    /// How many times `id` has been fetched (failed fetches included).
    pub fn fetch_count(&self, id: &ShardId) -> usize {
        lock(&self.inner.fetches).get(id).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.inner.total_fetches.load(Ordering::SeqCst)
    }
}

impl ShardSource for MemorySource {
    fn fetch_manifest(&self) -> BoxFuture<'static, Result<Vec<u8>, ShardError>> {
        let bytes = lock(&self.inner.manifest).clone();
        async move { Ok(bytes) }.boxed()
    }

    fn fetch_shard(&self, id: &ShardId) -> BoxFuture<'static, Result<Vec<u8>, ShardError>> {
        *lock(&self.inner.fetches).entry(id.clone()).or_insert(0) += 1;
        self.inner.total_fetches.fetch_add(1, Ordering::SeqCst);

        let result = if lock(&self.inner.failing).contains(id) {
            Err(ShardError::Fetch {
                shard: id.clone(),
                reason: "injected failure".to_string(),
            })
        } else {
            lock(&self.inner.shards)
                .get(id)
                .cloned()
                .ok_or_else(|| ShardError::NotFound { shard: id.clone() })
        };
        let latency = *lock(&self.inner.latency);

        async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            result
        }
        .boxed()
    }
}

/// Poisoning only happens if a holder panicked; the guarded data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
