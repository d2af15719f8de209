//! Source reconciliation over paginated vector embedding stores.
//!
//! Vector stores keep one flat record per ingested segment. This crate scans
//! every segment of a store with whatever paging primitive the backend offers
//! and folds them back into one summary per logical source document.
//!
//! This crate provides:
//! - A metadata vocabulary and the source key resolver
//! - Merge-max folding of segments into [`SourceSummary`] values
//! - Keyset, offset, native-iterator and count-then-offset cursors
//! - A backend-agnostic [`ScanDriver`] and the [`ListSourcesService`] front end
//! - Backend adapters behind feature flags (`pgvector`, `qdrant`, `chroma`,
//!   `elasticsearch`, `ai-search`, `weaviate`, `milvus`)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use embedscan::{InMemorySegmentStore, list_sources};
//!
//! let store = Arc::new(InMemorySegmentStore::new());
//! store.insert("docs", segments).await;
//! let listing = list_sources("docs", store, 500).await?;
//! assert_eq!(listing.source_count, listing.sources.len());
//! ```

pub mod backend;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod inmemory;
pub mod key;
pub mod merge;
pub mod metadata;
pub mod service;
pub mod source;

#[cfg(any(
    feature = "chroma",
    feature = "elasticsearch",
    feature = "ai-search",
    feature = "weaviate",
    feature = "milvus"
))]
mod http;

#[cfg(feature = "ai-search")]
pub mod aisearch;
#[cfg(feature = "chroma")]
pub mod chroma;
#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
#[cfg(feature = "milvus")]
pub mod milvus;
#[cfg(feature = "pgvector")]
pub mod pgvector;
#[cfg(feature = "qdrant")]
pub mod qdrant;
#[cfg(feature = "weaviate")]
pub mod weaviate;

pub use backend::{
    BackendKind, CountedOffsetScan, FilteredQueryScan, KeysetQuery, OffsetScan, ScanStrategy,
    ScrollBatch, ScrollScan, SegmentStore,
};
pub use config::{ScanConfig, ScanConfigBuilder};
pub use cursor::{
    CountThenOffsetCursor, KeysetBoundary, KeysetCursor, NativeIteratorCursor, OffsetCursor,
    Page, PaginationCursor, Termination,
};
pub use driver::{ScanDriver, ScanOutcome, ScanReport};
pub use error::{Result, ScanError};
pub use inmemory::InMemorySegmentStore;
pub use key::resolve_key;
pub use merge::{MergeOutcome, MergeStats, SourceRecordMerger};
pub use metadata::{Metadata, MetadataValue, SegmentRecord, fields};
pub use service::{ListSourcesService, list_sources};
pub use source::{SourceListing, SourceSummary};
