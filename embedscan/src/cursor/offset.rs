use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Page, PaginationCursor, short_page};
use crate::backend::{OffsetScan, ScanStrategy};
use crate::error::Result;

/// Resume point of an [`OffsetCursor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffsetState {
    pub offset: u64,
}

/// Pages through a backend by numeric row offset.
///
/// Stops on the first page shorter than the page size.
pub struct OffsetCursor {
    scan: Arc<dyn OffsetScan>,
    collection: String,
    page_size: usize,
}

impl OffsetCursor {
    pub fn new(scan: Arc<dyn OffsetScan>, collection: impl Into<String>, page_size: usize) -> Self {
        Self { scan, collection: collection.into(), page_size }
    }
}

#[async_trait]
impl PaginationCursor for OffsetCursor {
    type State = OffsetState;

    fn strategy(&self) -> ScanStrategy {
        ScanStrategy::Offset
    }

    fn initial_state(&self) -> OffsetState {
        OffsetState::default()
    }

    async fn fetch(&self, state: &OffsetState) -> Result<Page<OffsetState>> {
        let records = self.scan.fetch_offset(&self.collection, state.offset, self.page_size).await?;
        debug!(
            collection = %self.collection,
            offset = state.offset,
            records = records.len(),
            "fetched offset page"
        );

        let termination = short_page(records.len(), self.page_size);
        let next_state = OffsetState { offset: state.offset + self.page_size as u64 };
        Ok(Page { records, next_state, termination })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Termination;
    use crate::inmemory::InMemorySegmentStore;
    use crate::metadata::{Metadata, SegmentRecord, fields};

    async fn store_with(count: usize) -> Arc<InMemorySegmentStore> {
        let store = InMemorySegmentStore::new();
        let records = (0..count)
            .map(|i| {
                SegmentRecord::new(
                    format!("seg-{i}"),
                    Metadata::new().with(fields::SOURCE_ID, "doc").with(fields::INDEX, i as i64),
                )
            })
            .collect::<Vec<_>>();
        store.insert("docs", records).await;
        Arc::new(store)
    }

    #[tokio::test]
    async fn advances_by_page_size_until_short_page() {
        let cursor = OffsetCursor::new(store_with(5).await, "docs", 2);

        let first = cursor.fetch(&cursor.initial_state()).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.next_state.offset, 2);
        assert!(!first.exhausted());

        let second = cursor.fetch(&first.next_state).await.unwrap();
        let third = cursor.fetch(&second.next_state).await.unwrap();
        assert_eq!(third.records.len(), 1);
        assert_eq!(third.termination, Some(Termination::Exhausted));
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let cursor = OffsetCursor::new(store_with(4).await, "docs", 2);

        let mut state = cursor.initial_state();
        let mut fetches = 0;
        loop {
            let page = cursor.fetch(&state).await.unwrap();
            fetches += 1;
            if page.exhausted() {
                assert!(page.records.is_empty());
                break;
            }
            state = page.next_state;
        }
        assert_eq!(fetches, 3);
    }
}
