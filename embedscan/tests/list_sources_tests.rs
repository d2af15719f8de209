//! End-to-end tests for source listing over in-memory and scripted backends.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use embedscan::{
    BackendKind, InMemorySegmentStore, ListSourcesService, Metadata, OffsetScan, Result,
    ScanConfig, ScanError, ScanStrategy, ScrollBatch, ScrollScan, SegmentRecord, SegmentStore,
    SourceListing, Termination, fields, list_sources,
};

fn segment(id: &str, source_id: &str, index: i64) -> SegmentRecord {
    SegmentRecord::new(
        id,
        Metadata::new()
            .with(fields::SOURCE_ID, source_id)
            .with(fields::INGESTION_DATETIME, "2024-05-01T10:00:00Z")
            .with(fields::INDEX, index),
    )
}

fn count_of(listing: &SourceListing, source_id: &str) -> Option<u64> {
    listing
        .sources
        .iter()
        .find(|s| s.source_id.as_deref() == Some(source_id))
        .map(|s| s.segment_count)
}

fn config(page_size: usize) -> ScanConfig {
    ScanConfig::builder().page_size(page_size).embedding_dimensions(4).build().unwrap()
}

/// Serves fixed pages by offset, failing at a chosen page.
struct ScriptedPages {
    pages: Vec<Vec<SegmentRecord>>,
    fail_at: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedPages {
    fn new(pages: Vec<Vec<SegmentRecord>>) -> Self {
        Self { pages, fail_at: None, calls: AtomicUsize::new(0) }
    }

    fn failing_at(mut self, page: usize) -> Self {
        self.fail_at = Some(page);
        self
    }
}

#[async_trait]
impl OffsetScan for ScriptedPages {
    async fn fetch_offset(
        &self,
        _collection: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<SegmentRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let page = offset as usize / limit;
        if self.fail_at == Some(page) {
            return Err(ScanError::backend("scripted", "connection reset"));
        }
        Ok(self.pages.get(page).cloned().unwrap_or_default())
    }
}

impl SegmentStore for ScriptedPages {
    fn kind(&self) -> BackendKind {
        BackendKind::PgVector
    }

    fn offset_scan(self: Arc<Self>) -> Option<Arc<dyn OffsetScan>> {
        Some(self)
    }
}

#[tokio::test]
async fn merges_sources_split_across_pages() {
    let store = Arc::new(ScriptedPages::new(vec![
        vec![segment("1", "A", 0), segment("2", "A", 1)],
        vec![segment("3", "A", 2), segment("4", "B", 0)],
        vec![segment("5", "C", 0), segment("6", "C", 1)],
    ]));

    let listing = list_sources("docs", store.clone(), 2).await.unwrap();

    assert_eq!(listing.store_name, "docs");
    assert_eq!(listing.source_count, 3);
    assert_eq!(count_of(&listing, "A"), Some(3));
    assert_eq!(count_of(&listing, "B"), Some(1));
    assert_eq!(count_of(&listing, "C"), Some(2));
    // Three full pages and the empty page that proves exhaustion.
    assert_eq!(store.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn malformed_segment_is_skipped_without_error() {
    let malformed = SegmentRecord::new(
        "2",
        Metadata::new().with(fields::SOURCE_ID, "A").with(fields::URL, "https://example.com"),
    );
    let store = Arc::new(ScriptedPages::new(vec![vec![
        segment("1", "A", 0),
        malformed,
        segment("3", "B", 4),
    ]]));

    let service = ListSourcesService::new(store, config(10)).unwrap();
    let outcome = service.scan("docs").await.unwrap();

    assert_eq!(outcome.summaries.len(), 2);
    assert_eq!(outcome.report.merge.skipped_malformed, 1);
    assert_eq!(outcome.report.records, 3);
    let b = outcome.summaries.iter().find(|s| s.key == "B").unwrap();
    assert_eq!(b.segment_count, 5);
}

#[tokio::test]
async fn failure_on_second_page_discards_partial_result() {
    let store = Arc::new(
        ScriptedPages::new(vec![
            vec![segment("1", "A", 0), segment("2", "B", 0)],
            vec![segment("3", "C", 0), segment("4", "D", 0)],
        ])
        .failing_at(1),
    );

    let err = list_sources("docs", store.clone(), 2).await.unwrap_err();

    match err {
        ScanError::ScanFailed { backend, store: name, source } => {
            assert_eq!(backend, "pgvector");
            assert_eq!(name, "docs");
            assert!(matches!(*source, ScanError::Backend { .. }));
        }
        other => panic!("expected ScanFailed, got {other:?}"),
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
}

/// A store the capability table rejects; records any primitive lookup.
struct Pinecone {
    touched: AtomicBool,
}

impl SegmentStore for Pinecone {
    fn kind(&self) -> BackendKind {
        BackendKind::Pinecone
    }

    fn offset_scan(self: Arc<Self>) -> Option<Arc<dyn OffsetScan>> {
        self.touched.store(true, Ordering::SeqCst);
        None
    }
}

#[tokio::test]
async fn unscannable_backend_is_rejected_at_construction() {
    let store = Arc::new(Pinecone { touched: AtomicBool::new(false) });

    let err = ListSourcesService::new(store.clone(), ScanConfig::default()).err().unwrap();

    assert!(matches!(
        err,
        ScanError::UnsupportedCapability { ref backend, .. } if backend == "pinecone"
    ));
    assert!(!store.touched.load(Ordering::SeqCst));
}

#[tokio::test]
async fn explicit_strategy_requires_the_primitive() {
    let store = Arc::new(ScriptedPages::new(Vec::new()));
    let result = ListSourcesService::with_strategy(store, ScanStrategy::Keyset, config(10));
    assert!(matches!(result, Err(ScanError::UnsupportedCapability { .. })));
}

#[tokio::test]
async fn zero_page_size_is_a_config_error() {
    let store = Arc::new(InMemorySegmentStore::new());
    let err = list_sources("docs", store, 0).await.unwrap_err();
    assert!(matches!(err, ScanError::ConfigError(_)));
}

/// Scroll backend that fails after the first batch and records releases.
struct FlakyScroll {
    released: Mutex<Vec<String>>,
}

#[async_trait]
impl ScrollScan for FlakyScroll {
    async fn scroll(
        &self,
        _collection: &str,
        token: Option<&str>,
        _batch_size: usize,
    ) -> Result<ScrollBatch> {
        match token {
            None => Ok(ScrollBatch {
                records: vec![segment("1", "A", 0)],
                next_token: Some("ctx-1".to_string()),
            }),
            Some(_) => Err(ScanError::backend("elasticsearch", "search_context_missing_exception")),
        }
    }

    async fn release(&self, _collection: &str, token: &str) -> Result<()> {
        self.released.lock().unwrap().push(token.to_string());
        Ok(())
    }
}

impl SegmentStore for FlakyScroll {
    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    fn scroll_scan(self: Arc<Self>) -> Option<Arc<dyn ScrollScan>> {
        Some(self)
    }
}

#[tokio::test]
async fn scroll_handle_is_released_when_the_scan_fails() {
    let store = Arc::new(FlakyScroll { released: Mutex::new(Vec::new()) });
    let service = ListSourcesService::new(store.clone(), config(1)).unwrap();
    assert_eq!(service.strategy(), ScanStrategy::NativeIterator);

    assert!(service.list_sources("idx").await.is_err());
    assert_eq!(*store.released.lock().unwrap(), ["ctx-1"]);
}

#[tokio::test]
async fn concurrent_calls_do_not_share_state() {
    let store = Arc::new(InMemorySegmentStore::new());
    store
        .insert(
            "docs",
            (0..40).map(|i| segment(&format!("seg-{i}"), &format!("src-{}", i % 4), i / 4)),
        )
        .await;
    let service = Arc::new(ListSourcesService::new(store, config(3)).unwrap());

    let listings = futures::future::join_all((0..8).map(|_| {
        let service = Arc::clone(&service);
        async move { service.list_sources("docs").await.unwrap() }
    }))
    .await;

    for listing in &listings {
        assert_eq!(listing, &listings[0]);
        assert_eq!(listing.source_count, 4);
        assert!(listing.sources.iter().all(|s| s.segment_count == 10));
    }
}

#[tokio::test]
async fn keyset_scan_survives_identical_timestamps() {
    let store = Arc::new(InMemorySegmentStore::new());
    // Every segment shares one timestamp and pairs of sources share indexes.
    store
        .insert(
            "docs",
            (0..30).map(|i| segment(&format!("seg-{i:02}"), &format!("src-{}", i % 3), i / 3)),
        )
        .await;

    let service =
        ListSourcesService::with_strategy(store, ScanStrategy::Keyset, config(4)).unwrap();
    let outcome = service.scan("docs").await.unwrap();

    assert_eq!(outcome.report.termination, Termination::Exhausted);
    assert_eq!(outcome.report.records, 30);
    assert_eq!(outcome.summaries.len(), 3);
    assert!(outcome.summaries.iter().all(|s| s.segment_count == 10));
}

#[tokio::test]
async fn listing_serializes_in_camel_case() {
    let store = Arc::new(InMemorySegmentStore::new());
    store.insert("docs", [segment("1", "A", 2)]).await;

    let listing = list_sources("docs", store, 10).await.unwrap();
    let json = listing.to_json().unwrap();

    assert_eq!(json["storeName"], "docs");
    assert_eq!(json["sourceCount"], 1);
    assert_eq!(json["sources"][0]["segmentCount"], 3);
    assert_eq!(json["sources"][0]["sourceId"], "A");
}
