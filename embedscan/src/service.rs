//! Source listing service.
//!
//! [`ListSourcesService`] resolves the scan strategy for a backend once, at
//! construction, and then runs one independent scan per
//! [`list_sources`](ListSourcesService::list_sources) call.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use embedscan::{ListSourcesService, ScanConfig};
//! use embedscan::qdrant::QdrantScanStore;
//!
//! let store = Arc::new(QdrantScanStore::new("http://localhost:6334")?);
//! let service = ListSourcesService::new(store, ScanConfig::default())?;
//! let listing = service.list_sources("docs").await?;
//! println!("{}", serde_json::to_string_pretty(&listing)?);
//! ```

use std::sync::Arc;

use tracing::{error, info};

use crate::backend::{
    BackendKind, CountedOffsetScan, FilteredQueryScan, OffsetScan, ScanStrategy, ScrollScan,
    SegmentStore,
};
use crate::config::ScanConfig;
use crate::cursor::{CountThenOffsetCursor, KeysetCursor, NativeIteratorCursor, OffsetCursor};
use crate::driver::{ScanDriver, ScanOutcome};
use crate::error::{Result, ScanError};
use crate::source::SourceListing;

/// The paging primitive selected for a backend.
enum ScanPlan {
    Offset(Arc<dyn OffsetScan>),
    CountThenOffset(Arc<dyn CountedOffsetScan>),
    NativeIterator(Arc<dyn ScrollScan>),
    Keyset(Arc<dyn FilteredQueryScan>),
}

impl ScanPlan {
    fn strategy(&self) -> ScanStrategy {
        match self {
            ScanPlan::Offset(_) => ScanStrategy::Offset,
            ScanPlan::CountThenOffset(_) => ScanStrategy::CountThenOffset,
            ScanPlan::NativeIterator(_) => ScanStrategy::NativeIterator,
            ScanPlan::Keyset(_) => ScanStrategy::Keyset,
        }
    }
}

/// Lists the distinct sources stored in a vector store.
///
/// The service is `Send + Sync`; concurrent calls each own their cursor
/// state and merger.
pub struct ListSourcesService {
    kind: BackendKind,
    plan: ScanPlan,
    config: ScanConfig,
}

impl ListSourcesService {
    /// Create a service using the capability table's strategy for the backend.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::UnsupportedCapability`] if the backend cannot be
    /// enumerated, or [`ScanError::ConfigError`] for an invalid config. No
    /// backend call is made either way.
    pub fn new(backend: Arc<dyn SegmentStore>, config: ScanConfig) -> Result<Self> {
        let kind = backend.kind();
        let strategy = kind.scan_strategy().ok_or_else(|| ScanError::UnsupportedCapability {
            backend: kind.to_string(),
            reason: "backend exposes neither a listing primitive nor a filterable query"
                .to_string(),
        })?;
        Self::with_strategy(backend, strategy, config)
    }

    /// Create a service with an explicit strategy instead of the capability table's.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::UnsupportedCapability`] if the adapter does not
    /// implement the primitive the strategy needs.
    pub fn with_strategy(
        backend: Arc<dyn SegmentStore>,
        strategy: ScanStrategy,
        config: ScanConfig,
    ) -> Result<Self> {
        config.validate()?;
        let kind = backend.kind();
        let plan = match strategy {
            ScanStrategy::Offset => backend.offset_scan().map(ScanPlan::Offset),
            ScanStrategy::CountThenOffset => {
                backend.counted_offset_scan().map(ScanPlan::CountThenOffset)
            }
            ScanStrategy::NativeIterator => backend.scroll_scan().map(ScanPlan::NativeIterator),
            ScanStrategy::Keyset => backend.filtered_query_scan().map(ScanPlan::Keyset),
        }
        .ok_or_else(|| ScanError::UnsupportedCapability {
            backend: kind.to_string(),
            reason: format!("adapter does not implement {strategy} paging"),
        })?;

        Ok(Self { kind, plan, config })
    }

    /// The backend this service scans.
    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// The strategy resolved at construction.
    pub fn strategy(&self) -> ScanStrategy {
        self.plan.strategy()
    }

    /// The scan configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `store_name` completely and return its distinct sources.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ScanFailed`] naming the backend and store if any
    /// page fetch fails. Nothing merged before the failure is returned.
    pub async fn list_sources(&self, store_name: &str) -> Result<SourceListing> {
        let outcome = self.scan(store_name).await.map_err(|e| {
            error!(backend = %self.kind, store = store_name, error = %e, "listing sources failed");
            ScanError::ScanFailed {
                backend: self.kind.to_string(),
                store: store_name.to_string(),
                source: Box::new(e),
            }
        })?;

        let listing = SourceListing::new(store_name, outcome.summaries);
        info!(
            backend = %self.kind,
            store = store_name,
            source_count = listing.source_count,
            "listed sources"
        );
        Ok(listing)
    }

    /// Scan `store_name` and return the summaries together with scan counters.
    pub async fn scan(&self, store_name: &str) -> Result<ScanOutcome> {
        let page_size = self.config.page_size;
        match &self.plan {
            ScanPlan::Offset(scan) => {
                let cursor = OffsetCursor::new(Arc::clone(scan), store_name, page_size);
                ScanDriver::new(cursor, store_name).run().await
            }
            ScanPlan::CountThenOffset(scan) => {
                let cursor = CountThenOffsetCursor::new(Arc::clone(scan), store_name, page_size);
                ScanDriver::new(cursor, store_name).run().await
            }
            ScanPlan::NativeIterator(scan) => {
                let cursor = NativeIteratorCursor::new(Arc::clone(scan), store_name, page_size);
                ScanDriver::new(cursor, store_name).run().await
            }
            ScanPlan::Keyset(scan) => {
                let cursor = KeysetCursor::new(
                    Arc::clone(scan),
                    store_name,
                    page_size,
                    self.config.embedding_dimensions,
                );
                ScanDriver::new(cursor, store_name).run().await
            }
        }
    }
}

/// List the sources of `store_name` on `backend` with the given page size.
///
/// Shorthand for building a [`ListSourcesService`] with default settings and
/// calling [`ListSourcesService::list_sources`] once.
pub async fn list_sources(
    store_name: &str,
    backend: Arc<dyn SegmentStore>,
    page_size: usize,
) -> Result<SourceListing> {
    let config = ScanConfig::builder().page_size(page_size).build()?;
    ListSourcesService::new(backend, config)?.list_sources(store_name).await
}
