//! Per-query lifecycle and cancellation handle.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;

/// Where a single search is in its lifecycle.
///
/// `Idle → Normalizing → ResolvingShards → Loading → Matching → Ranking → Done`.
/// `Cancelled` is reachable from any non-terminal state; `Failed` is entered when
/// every shard the query needed was unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Normalizing,
    ResolvingShards,
    Loading,
    Matching,
    Ranking,
    Done,
    Cancelled,
    Failed,
}

impl QueryState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Handle to one search: its id, state and cancellation token.
///
/// Clones share state; cancelling any clone cancels the search and every cursor
/// it produced.
#[derive(Debug, Clone)]
pub struct SearchHandle {
    id: u64,
    token: CancellationToken,
    state: Arc<Mutex<QueryState>>,
}

impl SearchHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            token: CancellationToken::new(),
            state: Arc::new(Mutex::new(QueryState::Idle)),
        }
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current state. A cancelled search reports `Cancelled` even if it had finished.
    pub fn state(&self) -> QueryState {
        if self.token.is_cancelled() {
            QueryState::Cancelled
        } else {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Cancelling search #{} in state {}", self.id, self.state());
            self.token.cancel();
        }
    }

    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Moves to `next`. Terminal states are sticky.
    pub(crate) fn advance(&self, next: QueryState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_terminal() {
            return;
        }
        tracing::trace!("Search #{}: {} -> {}", self.id, *state, next);
        *state = next;
    }

    /// Cooperative cancellation point.
    pub(crate) fn checkpoint(&self) -> Result<(), SearchError> {
        if self.token.is_cancelled() {
            self.advance(QueryState::Cancelled);
            Err(SearchError::Cancelled)
        } else {
            Ok(())
        }
    }
}
