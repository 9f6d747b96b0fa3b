//! Paged access to a ranked result list.

use crate::error::SearchError;
use crate::search::state::{QueryState, SearchHandle};
use crate::types::Entry;
use std::sync::Arc;

/// One batch of results from [`ResultCursor::next`].
#[derive(Debug, Clone)]
pub struct Page {
    pub entries: Vec<Arc<Entry>>,
    pub has_more: bool,
}

/// Lazy, finite, restartable view over one search's ranked results.
///
/// The result list is shared and immutable; a cursor is just a position into it.
/// Once the owning search is cancelled (typically superseded by a newer
/// keystroke), every `next` call fails with [`SearchError::Cancelled`].
#[derive(Debug, Clone)]
pub struct ResultCursor {
    query: String,
    results: Arc<[Arc<Entry>]>,
    position: usize,
    page_size: usize,
    handle: SearchHandle,
}

impl ResultCursor {
    pub(crate) fn new(
        query: String,
        results: Vec<Arc<Entry>>,
        handle: SearchHandle,
        page_size: usize,
    ) -> Self {
        Self {
            query,
            results: results.into(),
            position: 0,
            page_size,
            handle,
        }
    }

    pub(crate) fn empty(query: String, handle: SearchHandle, page_size: usize) -> Self {
        Self::new(query, Vec::new(), handle, page_size)
    }

    /// Up to `n` further results, plus whether any remain after them.
    pub fn next(&mut self, n: usize) -> Result<Page, SearchError> {
        if self.handle.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let end = self.results.len().min(self.position.saturating_add(n));
        let entries = self.results[self.position..end].to_vec();
        self.position = end;

        Ok(Page {
            entries,
            has_more: end < self.results.len(),
        })
    }

    /// [`Self::next`] with the configured default page size.
    pub fn next_default(&mut self) -> Result<Page, SearchError> {
        self.next(self.page_size)
    }

    /// Restarts from the first result.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// A new cursor over the same results, positioned at the start.
    pub fn fresh(&self) -> Self {
        Self {
            position: 0,
            ..self.clone()
        }
    }

    /// The normalized query these results answer.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub const fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.results.len() - self.position
    }

    pub fn state(&self) -> QueryState {
        self.handle.state()
    }

    pub const fn handle(&self) -> &SearchHandle {
        &self.handle
    }
}
