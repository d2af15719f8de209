use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Page, PaginationCursor, Termination, short_page};
use crate::backend::{CountedOffsetScan, ScanStrategy};
use crate::error::Result;

/// Resume point of a [`CountThenOffsetCursor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountedState {
    pub offset: u64,
    /// Rows received so far.
    pub fetched: u64,
    /// Total reported by the backend; `None` until the first fetch.
    pub total: Option<u64>,
}

/// Offset paging preceded by one total-count call.
///
/// Besides the short-page rule, stops as soon as the rows received reach
/// the reported total, for backends that keep returning full pages past the
/// end of the collection.
pub struct CountThenOffsetCursor {
    scan: Arc<dyn CountedOffsetScan>,
    collection: String,
    page_size: usize,
}

impl CountThenOffsetCursor {
    pub fn new(
        scan: Arc<dyn CountedOffsetScan>,
        collection: impl Into<String>,
        page_size: usize,
    ) -> Self {
        Self { scan, collection: collection.into(), page_size }
    }
}

#[async_trait]
impl PaginationCursor for CountThenOffsetCursor {
    type State = CountedState;

    fn strategy(&self) -> ScanStrategy {
        ScanStrategy::CountThenOffset
    }

    fn initial_state(&self) -> CountedState {
        CountedState::default()
    }

    async fn fetch(&self, state: &CountedState) -> Result<Page<CountedState>> {
        let total = match state.total {
            Some(total) => total,
            None => {
                let total = self.scan.count(&self.collection).await?;
                debug!(collection = %self.collection, total, "counted segments");
                total
            }
        };

        if state.fetched >= total {
            let next_state = CountedState { total: Some(total), ..*state };
            return Ok(Page {
                records: Vec::new(),
                next_state,
                termination: Some(Termination::Exhausted),
            });
        }

        let records =
            self.scan.fetch_offset(&self.collection, state.offset, self.page_size).await?;
        let fetched = state.fetched + records.len() as u64;
        debug!(
            collection = %self.collection,
            offset = state.offset,
            records = records.len(),
            fetched,
            total,
            "fetched counted page"
        );

        let termination = short_page(records.len(), self.page_size)
            .or_else(|| (fetched >= total).then_some(Termination::Exhausted));
        let next_state = CountedState {
            offset: state.offset + self.page_size as u64,
            fetched,
            total: Some(total),
        };
        Ok(Page { records, next_state, termination })
    }
}
