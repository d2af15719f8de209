//! Backend paging primitives and the capability table that maps a backend
//! kind to the cursor strategy used to scan it.
//!
//! An adapter implements whichever primitives its store offers and
//! advertises them through [`SegmentStore`]. Every primitive is read-only and
//! returns metadata-only projections; vectors are never fetched.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cursor::KeysetBoundary;
use crate::error::{Result, ScanError};
use crate::metadata::SegmentRecord;

/// The vector store products a scan can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Milvus,
    #[serde(rename = "pgvector")]
    PgVector,
    Pinecone,
    Weaviate,
    Chroma,
    Elasticsearch,
    #[serde(rename = "opensearch")]
    OpenSearch,
    AiSearch,
    Qdrant,
    InMemory,
}

/// How a scan pages through a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStrategy {
    /// Zero-vector filtered query with an advancing boundary.
    Keyset,
    /// Numeric row offsets.
    Offset,
    /// Server-side scroll or iterator token.
    NativeIterator,
    /// One total-count call followed by offset paging.
    CountThenOffset,
}

impl BackendKind {
    /// All kinds, in declaration order.
    pub const ALL: [BackendKind; 10] = [
        BackendKind::Milvus,
        BackendKind::PgVector,
        BackendKind::Pinecone,
        BackendKind::Weaviate,
        BackendKind::Chroma,
        BackendKind::Elasticsearch,
        BackendKind::OpenSearch,
        BackendKind::AiSearch,
        BackendKind::Qdrant,
        BackendKind::InMemory,
    ];

    /// Capability table: the strategy used to enumerate this backend.
    ///
    /// `None` means the backend offers neither a listing primitive nor a
    /// filterable query and cannot be scanned.
    pub fn scan_strategy(self) -> Option<ScanStrategy> {
        match self {
            BackendKind::PgVector | BackendKind::InMemory => Some(ScanStrategy::Offset),
            BackendKind::Chroma => Some(ScanStrategy::CountThenOffset),
            BackendKind::Elasticsearch
            | BackendKind::OpenSearch
            | BackendKind::Milvus
            | BackendKind::Qdrant
            | BackendKind::Weaviate => Some(ScanStrategy::NativeIterator),
            BackendKind::AiSearch => Some(ScanStrategy::Keyset),
            BackendKind::Pinecone => None,
        }
    }

    /// Stable lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Milvus => "milvus",
            BackendKind::PgVector => "pgvector",
            BackendKind::Pinecone => "pinecone",
            BackendKind::Weaviate => "weaviate",
            BackendKind::Chroma => "chroma",
            BackendKind::Elasticsearch => "elasticsearch",
            BackendKind::OpenSearch => "opensearch",
            BackendKind::AiSearch => "ai-search",
            BackendKind::Qdrant => "qdrant",
            BackendKind::InMemory => "in-memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        BackendKind::ALL.into_iter().find(|kind| kind.as_str() == normalized).ok_or_else(|| {
            ScanError::ConfigError(format!("unknown backend '{s}'"))
        })
    }
}

impl ScanStrategy {
    /// Stable lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStrategy::Keyset => "keyset",
            ScanStrategy::Offset => "offset",
            ScanStrategy::NativeIterator => "native-iterator",
            ScanStrategy::CountThenOffset => "count-then-offset",
        }
    }
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStrategy {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "keyset" => Ok(ScanStrategy::Keyset),
            "offset" => Ok(ScanStrategy::Offset),
            "native-iterator" | "iterator" | "scroll" => Ok(ScanStrategy::NativeIterator),
            "count-then-offset" | "counted" => Ok(ScanStrategy::CountThenOffset),
            _ => Err(ScanError::ConfigError(format!("unknown scan strategy '{s}'"))),
        }
    }
}

/// Paging by numeric row offset.
#[async_trait]
pub trait OffsetScan: Send + Sync {
    /// Return up to `limit` records starting at row `offset`, in a stable order.
    async fn fetch_offset(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<SegmentRecord>>;
}

/// Offset paging on a backend that reports its total row count.
#[async_trait]
pub trait CountedOffsetScan: OffsetScan {
    /// Total number of records in the collection.
    async fn count(&self, collection: &str) -> Result<u64>;
}

/// One batch from a server-side iterator.
#[derive(Debug, Clone, Default)]
pub struct ScrollBatch {
    /// Records in this batch.
    pub records: Vec<SegmentRecord>,
    /// Token for the following batch; `None` when the iterator is finished.
    pub next_token: Option<String>,
}

/// Paging with a server-side scroll handle or iterator token.
#[async_trait]
pub trait ScrollScan: Send + Sync {
    /// Fetch the next batch. `token` is `None` to open the iterator.
    ///
    /// `batch_size` is a hint; backends may return more or fewer records.
    async fn scroll(
        &self,
        collection: &str,
        token: Option<&str>,
        batch_size: usize,
    ) -> Result<ScrollBatch>;

    /// Release a server-side handle. Called once when the scan ends, on
    /// success and on failure.
    async fn release(&self, _collection: &str, _token: &str) -> Result<()> {
        Ok(())
    }
}

/// A similarity query used to walk a store that has no listing primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetQuery {
    /// Query vector; all zeros so no segment is preferred.
    pub vector: Vec<f32>,
    /// Minimum similarity score.
    pub min_score: f32,
    /// Maximum number of records to return.
    pub limit: usize,
    /// Only records strictly after this boundary; `None` on the first page.
    pub after: Option<KeysetBoundary>,
}

/// Metadata-filtered similarity query.
#[async_trait]
pub trait FilteredQueryScan: Send + Sync {
    /// Return up to `query.limit` records whose
    /// `(ingestion_datetime, index, embedding_id)` is strictly greater than
    /// `query.after`, ascending in that order. `ingestion_datetime` is
    /// ordered as a plain string, matching [`KeysetBoundary`]'s `Ord`.
    async fn query(&self, collection: &str, query: &KeysetQuery) -> Result<Vec<SegmentRecord>>;
}

/// A backend adapter advertising the paging primitives it implements.
///
/// Adapters override the accessor for each primitive they support,
/// typically as `Some(self)`.
pub trait SegmentStore: Send + Sync {
    /// Which product this adapter talks to.
    fn kind(&self) -> BackendKind;

    fn offset_scan(self: Arc<Self>) -> Option<Arc<dyn OffsetScan>> {
        None
    }

    fn counted_offset_scan(self: Arc<Self>) -> Option<Arc<dyn CountedOffsetScan>> {
        None
    }

    fn scroll_scan(self: Arc<Self>) -> Option<Arc<dyn ScrollScan>> {
        None
    }

    fn filtered_query_scan(self: Arc<Self>) -> Option<Arc<dyn FilteredQueryScan>> {
        None
    }
}
