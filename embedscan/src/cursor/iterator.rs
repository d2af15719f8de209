use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Page, PaginationCursor, Termination};
use crate::backend::{ScanStrategy, ScrollScan};
use crate::error::Result;

/// Resume point of a [`NativeIteratorCursor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollState {
    /// Server-side handle for the next batch; `None` before the first fetch.
    pub token: Option<String>,
    /// Batches received so far.
    pub batches: u64,
}

/// Wraps a backend scroll or query iterator.
///
/// The page size is passed to the backend as a batch-size hint only. The
/// scan ends when the backend hands back no continuation token or an empty
/// batch. [`release`](PaginationCursor::release) clears the live handle.
pub struct NativeIteratorCursor {
    scan: Arc<dyn ScrollScan>,
    collection: String,
    batch_size: usize,
}

impl NativeIteratorCursor {
    pub fn new(
        scan: Arc<dyn ScrollScan>,
        collection: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self { scan, collection: collection.into(), batch_size }
    }
}

#[async_trait]
impl PaginationCursor for NativeIteratorCursor {
    type State = ScrollState;

    fn strategy(&self) -> ScanStrategy {
        ScanStrategy::NativeIterator
    }

    fn initial_state(&self) -> ScrollState {
        ScrollState::default()
    }

    async fn fetch(&self, state: &ScrollState) -> Result<Page<ScrollState>> {
        let batch =
            self.scan.scroll(&self.collection, state.token.as_deref(), self.batch_size).await?;
        debug!(
            collection = %self.collection,
            batch = state.batches,
            records = batch.records.len(),
            more = batch.next_token.is_some(),
            "fetched scroll batch"
        );

        let termination = (batch.records.is_empty() || batch.next_token.is_none())
            .then_some(Termination::Exhausted);
        let next_state = ScrollState { token: batch.next_token, batches: state.batches + 1 };
        Ok(Page { records: batch.records, next_state, termination })
    }

    async fn release(&self, state: &ScrollState) -> Result<()> {
        match &state.token {
            Some(token) => self.scan.release(&self.collection, token).await,
            None => Ok(()),
        }
    }
}
