mod common;

use assert2::{check, let_assert};
use common::{fixture_entries, shard};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use symdex::{Entry, MemorySource, PartitionTable, SearchConfig, ShardBuilder, ShardError, ShardStore};

fn config(ttl_ms: u64, timeout_ms: u64) -> SearchConfig {
    SearchConfig {
        negative_cache_ttl_ms: ttl_ms,
        load_timeout_ms: timeout_ms,
        ..SearchConfig::default()
    }
}

async fn open(entries: Vec<Entry>, config: &SearchConfig, latency: Option<Duration>) -> (ShardStore, MemorySource) {
    let mut builder = ShardBuilder::new();
    builder.extend(entries);
    let mut source = builder.build(1).into_memory_source().unwrap();
    if let Some(latency) = latency {
        source = source.with_latency(latency);
    }
    let store = ShardStore::open(Arc::new(source.clone()), config).await.unwrap();
    (store, source)
}

/// Test: concurrent requests for one shard share a single fetch.
#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_loads_fetch_once(fixture_entries: Vec<Entry>) {
    let (store, source) = open(fixture_entries, &SearchConfig::default(), Some(Duration::from_millis(50))).await;
    let id = shard("pe");

    let results = join_all((0..8).map(|_| store.ensure_loaded(&id))).await;

    check!(source.fetch_count(&id) == 1);
    let shards: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    check!(shards.iter().all(|s| Arc::ptr_eq(s, &shards[0])));
    check!(store.is_cached(&id).await);
    check!(!store.is_loading(&id).await);
}

/// Test: loads for different shards run independently.
#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn distinct_shards_load_independently(fixture_entries: Vec<Entry>) {
    let (store, source) = open(fixture_entries, &SearchConfig::default(), None).await;
    source.fail_shard(&shard("wo"));

    let (wa_id, wo_id) = (shard("wa"), shard("wo"));
    let (wa, wo) = tokio::join!(store.ensure_loaded(&wa_id), store.ensure_loaded(&wo_id));

    check!(wa.is_ok());
    let_assert!(Err(ShardError::Fetch { shard: failed, .. }) = wo);
    check!(failed == wo_id);
    check!(store.cached_count().await == 1);
}

/// Test: a failure is remembered for the TTL, then retried.
#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn negative_cache_expires(fixture_entries: Vec<Entry>) {
    let (store, source) = open(fixture_entries, &config(50, 5_000), None).await;
    let id = shard("bo");
    source.fail_shard(&id);

    check!(store.ensure_loaded(&id).await.is_err());
    source.heal_shard(&id);
    check!(store.ensure_loaded(&id).await.is_err());
    check!(source.fetch_count(&id) == 1);

    tokio::time::sleep(Duration::from_millis(80)).await;

    check!(store.ensure_loaded(&id).await.is_ok());
    check!(source.fetch_count(&id) == 2);
}

/// Test: a slow source is cut off by the load timeout.
#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn slow_fetch_times_out(fixture_entries: Vec<Entry>) {
    let (store, _source) = open(fixture_entries, &config(2_000, 20), Some(Duration::from_millis(200))).await;

    let_assert!(Err(ShardError::Timeout { millis, .. }) = store.ensure_loaded(&shard("pe")).await);
    check!(millis == 20);
    check!(!store.is_cached(&shard("pe")).await);
}

/// Test: a load started before a publish answers its caller but is not cached.
#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_load_is_not_cached(fixture_entries: Vec<Entry>) {
    let (store, _source) = open(fixture_entries, &SearchConfig::default(), Some(Duration::from_millis(100))).await;
    let store = Arc::new(store);
    let id = shard("pe");

    let loading = tokio::spawn({
        let store = store.clone();
        let id = id.clone();
        async move { store.ensure_loaded(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    check!(store.is_loading(&id).await);

    let table = PartitionTable::new(2, store.partitions().await.iter().cloned());
    store.publish(table).await;

    let result = loading.await.unwrap();
    check!(result.is_ok());
    check!(!store.is_cached(&id).await);
    check!(store.version().await == 2);
}

/// Test: republishing the same version keeps the cache.
#[rstest::rstest]
#[tokio::test(flavor = "multi_thread")]
async fn same_version_publish_keeps_cache(fixture_entries: Vec<Entry>) {
    let (store, source) = open(fixture_entries, &SearchConfig::default(), None).await;
    store.ensure_loaded(&shard("pe")).await.unwrap();

    store.publish(store.partitions().await).await;

    check!(store.is_cached(&shard("pe")).await);
    store.ensure_loaded(&shard("pe")).await.unwrap();
    check!(source.fetch_count(&shard("pe")) == 1);
}
