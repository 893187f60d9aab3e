//! Lazy, restartable reads over the interaction log.
//!
//! A cursor fetches one page at a time using `after_id`, so it never holds
//! more than a page in memory and can be resumed from any id it has handed out.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use futures::stream;

use crate::error::StorageError;
use crate::store::model::{Interaction, InteractionFilter};
use crate::store::traits::MemoryStore;

/// Default number of rows fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Paging cursor over `MemoryStore::query_interactions`.
pub struct InteractionCursor {
    store: Arc<dyn MemoryStore>,
    filter: InteractionFilter,
    page_size: usize,
    /// Overall cap taken from `filter.limit`.
    remaining: Option<usize>,
    /// Id of the last interaction handed out.
    position: Option<i64>,
    exhausted: bool,
}

impl InteractionCursor {
    pub fn new(store: Arc<dyn MemoryStore>, filter: InteractionFilter, page_size: usize) -> Self {
        let remaining = filter.limit;
        let position = filter.after_id;
        Self {
            store,
            filter,
            page_size: page_size.max(1),
            remaining,
            position,
            exhausted: false,
        }
    }

    /// Id of the last interaction returned, if any.
    pub fn position(&self) -> Option<i64> {
        self.position
    }

    /// Restart from just after `id`.
    pub fn resume_after(mut self, id: i64) -> Self {
        self.position = Some(id);
        self.exhausted = false;
        self
    }

    /// Fetch the next page. An empty page means the cursor is exhausted.
    pub async fn next_page(&mut self) -> Result<Vec<Interaction>, StorageError> {
        if self.exhausted || self.remaining == Some(0) {
            return Ok(Vec::new());
        }

        let want = match self.remaining {
            Some(rem) => rem.min(self.page_size),
            None => self.page_size,
        };
        let mut filter = self.filter.clone();
        filter.after_id = self.position;
        filter.limit = Some(want);

        let page = self.store.query_interactions(&filter).await?;
        if page.len() < want {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.position = Some(last.id);
        }
        if let Some(rem) = self.remaining.as_mut() {
            *rem = rem.saturating_sub(page.len());
        }
        Ok(page)
    }

    /// Drain every remaining page into one vector.
    pub async fn collect_all(mut self) -> Result<Vec<Interaction>, StorageError> {
        let mut all = Vec::new();
        loop {
            let page = self.next_page().await?;
            if page.is_empty() {
                return Ok(all);
            }
            all.extend(page);
        }
    }

    /// Turn the cursor into a stream of interactions.
    pub fn into_stream(self) -> impl Stream<Item = Result<Interaction, StorageError>> + Send {
        stream::unfold(
            (self, VecDeque::new(), false),
            |(mut cursor, mut buffered, failed)| async move {
                if failed {
                    return None;
                }
                if buffered.is_empty() {
                    match cursor.next_page().await {
                        Ok(page) => buffered.extend(page),
                        Err(e) => return Some((Err(e), (cursor, buffered, true))),
                    }
                }
                buffered
                    .pop_front()
                    .map(|item| (Ok(item), (cursor, buffered, false)))
            },
        )
    }
}
