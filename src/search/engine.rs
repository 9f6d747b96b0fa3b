//! Query orchestration: normalize, resolve shards, load, match, rank.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::search::cursor::ResultCursor;
use crate::search::index::IndexSnapshot;
use crate::search::scoring::rank;
use crate::search::state::{QueryState, SearchHandle};
use crate::shard::{Shard, ShardStore};
use crate::types::{Entry, ShardId, normalize_key};
use ahash::{AHashMap, AHashSet};
use futures::future::join_all;
use rapidfuzz::distance::jaro_winkler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Suggestions scoring at or below this similarity are not worth showing.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A "did you mean" candidate.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub entry: Arc<Entry>,
    /// Jaro-Winkler similarity between query and key (0.0 to 1.0, higher is better).
    pub score: f64,
}

/// Runs searches against a [`ShardStore`] with typeahead semantics.
///
/// Each new [`search`](Self::search) cancels the one before it. Matching and
/// ranking work on immutable snapshots and local state only, so a superseded
/// search can never change what the current one returns.
pub struct QueryEngine {
    store: Arc<ShardStore>,
    config: SearchConfig,
    /// Index snapshots keyed by shard id and content fingerprint
    snapshots: RwLock<AHashMap<(ShardId, u64), Arc<IndexSnapshot>>>,
    /// The most recent search of this session
    current: Mutex<Option<SearchHandle>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("store", &self.store)
            .field("config", &self.config)
            .field(
                "snapshot_count",
                &self.snapshots.read().map(|s| s.len()).unwrap_or_default(),
            )
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    pub fn new(store: Arc<ShardStore>, config: SearchConfig) -> Self {
        Self {
            store,
            config,
            snapshots: RwLock::new(AHashMap::new()),
            current: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    pub const fn store(&self) -> &Arc<ShardStore> {
        &self.store
    }

    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Searches for `raw`, superseding any search still running on this engine.
    ///
    /// Shards that fail to load are left out of the results. Only when every
    /// shard the query needs is unavailable does this fail, with
    /// [`SearchError::SearchUnavailable`]. A search superseded while it was
    /// loading returns [`SearchError::Cancelled`].
    pub async fn search(&self, raw: &str) -> Result<ResultCursor, SearchError> {
        let handle = self.begin();
        let page_size = self.config.default_page_size;

        handle.advance(QueryState::Normalizing);
        let query = normalize_key(raw.trim());
        if query.is_empty() {
            handle.advance(QueryState::Done);
            return Ok(ResultCursor::empty(query, handle, page_size));
        }

        handle.advance(QueryState::ResolvingShards);
        let ids = self.store.shards_for(&query).await;
        if ids.is_empty() {
            tracing::debug!("No shard covers query '{}'", query);
            handle.advance(QueryState::Done);
            return Ok(ResultCursor::empty(query, handle, page_size));
        }

        handle.checkpoint()?;
        handle.advance(QueryState::Loading);
        let loads = join_all(ids.iter().map(|id| self.store.ensure_loaded(id)));
        let results = tokio::select! {
            biased;
            () = handle.token().cancelled() => {
                handle.advance(QueryState::Cancelled);
                tracing::debug!("Search #{} for '{}' cancelled while loading", handle.id(), query);
                return Err(SearchError::Cancelled);
            }
            results = loads => results,
        };
        handle.checkpoint()?;

        let mut shards: Vec<Arc<Shard>> = Vec::with_capacity(ids.len());
        let mut failed: Vec<ShardId> = Vec::new();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(shard) => shards.push(shard),
                Err(e) => {
                    tracing::debug!("Leaving shard '{}' out of '{}': {}", id, query, e);
                    failed.push(id);
                }
            }
        }

        if shards.is_empty() {
            handle.advance(QueryState::Failed);
            tracing::warn!("Search for '{}' unavailable: all {} shards failed", query, failed.len());
            return Err(SearchError::SearchUnavailable { shards: failed });
        }
        if !failed.is_empty() {
            tracing::warn!(
                "Search for '{}' degraded: {} of {} shards unavailable",
                query,
                failed.len(),
                failed.len() + shards.len()
            );
        }

        handle.advance(QueryState::Matching);
        let snapshots: Vec<Arc<IndexSnapshot>> = shards.iter().map(|s| self.snapshot(s)).collect();
        let mut matches: Vec<Arc<Entry>> = snapshots
            .iter()
            .flat_map(|s| s.match_prefix(&query).cloned())
            .collect();
        if matches.len() < self.config.min_results {
            tracing::trace!(
                "Only {} prefix matches for '{}', widening to substring matches",
                matches.len(),
                query
            );
            matches = snapshots
                .iter()
                .flat_map(|s| s.match_contains(&query).cloned())
                .collect();
        }

        handle.advance(QueryState::Ranking);
        let ranked = rank(&query, matches);

        // Past the last suspension point: finish, but discard if superseded meanwhile
        handle.checkpoint()?;
        handle.advance(QueryState::Done);
        tracing::debug!(
            "Search #{} for '{}': {} results from {} shards",
            handle.id(),
            query,
            ranked.len(),
            snapshots.len()
        );
        Ok(ResultCursor::new(query, ranked, handle, page_size))
    }

    /// Cancels one search. Its cursors start failing with `Cancelled`.
    pub fn cancel(&self, handle: &SearchHandle) {
        handle.cancel();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| c.id() == handle.id()) {
            *current = None;
        }
    }

    /// Cancels whatever search is current, if any.
    pub fn cancel_current(&self) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = previous {
            handle.cancel();
        }
    }

    /// Handle of the most recent search, if it hasn't been cancelled.
    pub fn current(&self) -> Option<SearchHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Close matches for `raw` among shards already loaded for its first character.
    ///
    /// Never triggers a load, so it is safe to call on every keystroke.
    pub async fn suggest(&self, raw: &str, limit: usize) -> Vec<Suggestion> {
        let query = normalize_key(raw.trim());
        let Some(first) = query.chars().next() else {
            return vec![];
        };

        let mut candidates: Vec<Suggestion> = Vec::new();
        let mut seen = AHashSet::new();
        for id in self.store.shards_for(&first.to_string()).await {
            let Some(shard) = self.store.cached(&id).await else {
                continue;
            };
            for entry in shard.entries() {
                if !seen.insert(entry.key().to_string()) {
                    continue;
                }
                let score = jaro_winkler::similarity(query.chars(), entry.key().chars());
                if score > SUGGESTION_THRESHOLD {
                    candidates.push(Suggestion {
                        entry: entry.clone(),
                        score,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entry.display_name().cmp(b.entry.display_name()))
        });
        candidates.truncate(limit);
        candidates
    }

    /// Registers a new search and cancels the previous one.
    fn begin(&self) -> SearchHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = SearchHandle::new(id);

        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        handle
    }

    /// The cached snapshot for a shard, building it on first use.
    fn snapshot(&self, shard: &Shard) -> Arc<IndexSnapshot> {
        let key = (shard.id().clone(), shard.fingerprint());
        if let Some(snapshot) = self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return snapshot.clone();
        }

        let snapshot = Arc::new(IndexSnapshot::build(shard));
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        // A republished shard replaces its old snapshot
        snapshots.retain(|(id, fingerprint), _| id != shard.id() || *fingerprint == key.1);
        snapshots.entry(key).or_insert(snapshot).clone()
    }
}
