use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Page, PaginationCursor, Termination};
use crate::backend::{FilteredQueryScan, KeysetQuery, ScanStrategy};
use crate::error::Result;
use crate::metadata::{SegmentRecord, fields};

/// A position in `(ingestion_datetime, index, embedding_id)` order.
///
/// `ingestion_datetime` is compared as the stored string, byte by byte, which
/// is how string-typed backend fields sort and filter. For RFC 3339 UTC
/// timestamps written with a fixed precision this is chronological order.
/// The embedding id breaks ties between segments of different sources
/// ingested at the same time with the same index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeysetBoundary {
    /// Raw `ingestion_datetime` metadata value.
    pub ingestion_datetime: String,
    /// Segment position within its source.
    pub index: i64,
    /// Tiebreaker between otherwise equal positions.
    pub embedding_id: String,
}

impl KeysetBoundary {
    pub fn new(
        ingestion_datetime: impl Into<String>,
        index: i64,
        embedding_id: impl Into<String>,
    ) -> Self {
        Self {
            ingestion_datetime: ingestion_datetime.into(),
            index,
            embedding_id: embedding_id.into(),
        }
    }

    /// The boundary a record sits at, if it carries a datetime and an index.
    pub fn from_record(record: &SegmentRecord) -> Option<Self> {
        let ingestion_datetime = record.metadata.str_field(fields::INGESTION_DATETIME)?;
        let index = record.metadata.int_field(fields::INDEX)?;
        Some(Self { ingestion_datetime, index, embedding_id: record.embedding_id.clone() })
    }

    /// Whether `record` lies strictly after this boundary.
    ///
    /// Records without a datetime or index are never after a boundary.
    pub fn precedes(&self, record: &SegmentRecord) -> bool {
        KeysetBoundary::from_record(record).is_some_and(|other| other > *self)
    }
}

/// Resume point of a [`KeysetCursor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeysetState {
    /// Greatest boundary observed so far; `None` before the first page.
    pub boundary: Option<KeysetBoundary>,
    /// Embedding id of the last record of the previous page.
    pub last_seen_id: Option<String>,
}

/// Walks a store whose only read primitive is a filtered similarity query.
///
/// Each page is a zero-vector query with `min_score = 0` restricted to
/// records after the current boundary. The boundary then advances to the
/// greatest `(ingestion_datetime, index, embedding_id)` in the page, so it
/// never moves backwards.
///
/// The scan ends on a short page. A full page whose last record repeats the
/// previous page's last record, or that fails to move the boundary, ends the
/// scan through [`Termination::LivelockGuard`] instead of looping forever.
pub struct KeysetCursor {
    scan: Arc<dyn FilteredQueryScan>,
    collection: String,
    page_size: usize,
    dimensions: usize,
}

impl KeysetCursor {
    pub fn new(
        scan: Arc<dyn FilteredQueryScan>,
        collection: impl Into<String>,
        page_size: usize,
        dimensions: usize,
    ) -> Self {
        Self { scan, collection: collection.into(), page_size, dimensions }
    }

    fn query(&self, after: Option<KeysetBoundary>) -> KeysetQuery {
        KeysetQuery {
            vector: vec![0.0; self.dimensions],
            min_score: 0.0,
            limit: self.page_size,
            after,
        }
    }
}

#[async_trait]
impl PaginationCursor for KeysetCursor {
    type State = KeysetState;

    fn strategy(&self) -> ScanStrategy {
        ScanStrategy::Keyset
    }

    fn initial_state(&self) -> KeysetState {
        KeysetState::default()
    }

    async fn fetch(&self, state: &KeysetState) -> Result<Page<KeysetState>> {
        let records = self.scan.query(&self.collection, &self.query(state.boundary.clone())).await?;

        let page_max = records.iter().filter_map(KeysetBoundary::from_record).max();
        let boundary = match (state.boundary.clone(), page_max) {
            (Some(previous), Some(page_max)) => Some(previous.max(page_max)),
            (previous, page_max) => previous.or(page_max),
        };
        let last_id = records.last().map(|r| r.embedding_id.clone());

        debug!(
            collection = %self.collection,
            records = records.len(),
            boundary = ?boundary,
            "fetched keyset page"
        );

        let termination = if records.len() < self.page_size {
            Some(Termination::Exhausted)
        } else if last_id.is_some() && last_id == state.last_seen_id {
            warn!(
                collection = %self.collection,
                last_id = ?last_id,
                "keyset page repeated the previous page; stopping scan"
            );
            Some(Termination::LivelockGuard)
        } else if boundary == state.boundary {
            warn!(
                collection = %self.collection,
                boundary = ?boundary,
                "keyset page did not advance the boundary; stopping scan"
            );
            Some(Termination::LivelockGuard)
        } else {
            None
        };

        let next_state =
            KeysetState { boundary, last_seen_id: last_id.or_else(|| state.last_seen_id.clone()) };
        Ok(Page { records, next_state, termination })
    }
}
