//! In-memory segment store.
//!
//! This module provides [`InMemorySegmentStore`], a zero-dependency store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It implements
//! every paging primitive, which makes it the reference backend for tests
//! and for comparing strategies against one dataset.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{
    BackendKind, CountedOffsetScan, FilteredQueryScan, KeysetQuery, OffsetScan, ScrollBatch,
    ScrollScan, SegmentStore,
};
use crate::cursor::KeysetBoundary;
use crate::error::{Result, ScanError};
use crate::metadata::SegmentRecord;

const BACKEND: &str = "in-memory";

#[derive(Debug, Clone)]
struct StoredSegment {
    record: SegmentRecord,
    embedding: Vec<f32>,
}

/// An in-memory collection of segments, kept in insertion order.
///
/// Re-inserting an existing embedding id replaces the segment in place.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use embedscan::{InMemorySegmentStore, list_sources};
///
/// let store = InMemorySegmentStore::new();
/// store.insert("docs", records).await;
/// let listing = list_sources("docs", Arc::new(store), 100).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemorySegmentStore {
    collections: RwLock<HashMap<String, Vec<StoredSegment>>>,
}

impl InMemorySegmentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection. No-op if it already exists.
    pub async fn create_collection(&self, name: &str) {
        self.collections.write().await.entry(name.to_string()).or_default();
    }

    /// Insert segments without embeddings, creating the collection if needed.
    pub async fn insert(&self, collection: &str, records: impl IntoIterator<Item = SegmentRecord>) {
        self.insert_embedded(collection, records.into_iter().map(|r| (r, Vec::new()))).await;
    }

    /// Insert segments with their embeddings, creating the collection if needed.
    pub async fn insert_embedded(
        &self,
        collection: &str,
        segments: impl IntoIterator<Item = (SegmentRecord, Vec<f32>)>,
    ) {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();
        for (record, embedding) in segments {
            let segment = StoredSegment { record, embedding };
            match stored.iter_mut().find(|s| s.record.embedding_id == segment.record.embedding_id) {
                Some(existing) => *existing = segment,
                None => stored.push(segment),
            }
        }
    }

    /// Number of segments in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections.read().await.get(collection).map_or(0, Vec::len)
    }

    async fn slice(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<SegmentRecord>> {
        let collections = self.collections.read().await;
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(stored
            .iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit)
            .map(|s| s.record.clone())
            .collect())
    }
}

fn missing(collection: &str) -> ScanError {
    ScanError::backend(BACKEND, format!("collection '{collection}' does not exist"))
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl OffsetScan for InMemorySegmentStore {
    async fn fetch_offset(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<SegmentRecord>> {
        self.slice(collection, offset, limit).await
    }
}

#[async_trait]
impl CountedOffsetScan for InMemorySegmentStore {
    async fn count(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().await;
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(stored.len() as u64)
    }
}

#[async_trait]
impl ScrollScan for InMemorySegmentStore {
    async fn scroll(
        &self,
        collection: &str,
        token: Option<&str>,
        batch_size: usize,
    ) -> Result<ScrollBatch> {
        let offset: u64 = match token {
            Some(token) => token.parse().map_err(|_| {
                ScanError::backend(BACKEND, format!("invalid scroll token '{token}'"))
            })?,
            None => 0,
        };
        let records = self.slice(collection, offset, batch_size).await?;
        let next = offset + records.len() as u64;
        let total = self.count(collection).await?;
        let next_token = (next < total).then(|| next.to_string());
        Ok(ScrollBatch { records, next_token })
    }
}

#[async_trait]
impl FilteredQueryScan for InMemorySegmentStore {
    async fn query(&self, collection: &str, query: &KeysetQuery) -> Result<Vec<SegmentRecord>> {
        let collections = self.collections.read().await;
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut matches: Vec<&SegmentRecord> = stored
            .iter()
            .filter(|s| cosine_similarity(&s.embedding, &query.vector) >= query.min_score)
            .map(|s| &s.record)
            .filter(|r| query.after.as_ref().is_none_or(|after| after.precedes(r)))
            .collect();

        matches.sort_by_cached_key(|r| KeysetBoundary::from_record(r));
        Ok(matches.into_iter().take(query.limit).cloned().collect())
    }
}

impl SegmentStore for InMemorySegmentStore {
    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }

    fn offset_scan(self: Arc<Self>) -> Option<Arc<dyn OffsetScan>> {
        Some(self)
    }

    fn counted_offset_scan(self: Arc<Self>) -> Option<Arc<dyn CountedOffsetScan>> {
        Some(self)
    }

    fn scroll_scan(self: Arc<Self>) -> Option<Arc<dyn ScrollScan>> {
        Some(self)
    }

    fn filtered_query_scan(self: Arc<Self>) -> Option<Arc<dyn FilteredQueryScan>> {
        Some(self)
    }
}
