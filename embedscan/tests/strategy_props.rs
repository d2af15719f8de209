//! Property tests: every pagination strategy reconstructs the same sources.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use embedscan::{
    FilteredQueryScan, InMemorySegmentStore, KeysetBoundary, KeysetCursor, KeysetQuery,
    ListSourcesService, Metadata, PaginationCursor, ScanConfig, ScanOutcome, ScanStrategy,
    SegmentRecord, SourceRecordMerger, Termination, fields, resolve_key,
};
use proptest::prelude::*;

const STRATEGIES: [ScanStrategy; 4] = [
    ScanStrategy::Offset,
    ScanStrategy::CountThenOffset,
    ScanStrategy::NativeIterator,
    ScanStrategy::Keyset,
];

const DATETIMES: [&str; 3] =
    ["2024-05-01T10:00:00Z", "2024-05-01T10:00:00.250Z", "2024-05-02T08:30:00+02:00"];

/// A segment of one of a handful of sources. Sources are keyed either by
/// `source_id` or by `url` plus datetime, and datetimes collide on purpose.
fn arb_segment() -> impl Strategy<Value = (usize, usize, bool, i64)> {
    (0usize..6, 0usize..DATETIMES.len(), any::<bool>(), 0i64..12)
}

fn build_records(specs: &[(usize, usize, bool, i64)]) -> Vec<SegmentRecord> {
    specs
        .iter()
        .enumerate()
        .map(|(n, &(source, at, by_url, index))| {
            let metadata = if by_url {
                Metadata::new().with(fields::URL, format!("https://example.com/{source}"))
            } else {
                Metadata::new().with(fields::SOURCE_ID, format!("src-{source}"))
            };
            SegmentRecord::new(
                format!("seg-{n:04}"),
                metadata
                    .with(fields::INGESTION_DATETIME, DATETIMES[at])
                    .with(fields::INDEX, index),
            )
        })
        .collect()
}

/// Expected `1 + max(index)` per key, computed without any paging.
fn expected_counts(records: &[SegmentRecord]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for record in records {
        let index = record.metadata.int_field(fields::INDEX).unwrap() as u64;
        let count = counts.entry(resolve_key(&record.metadata)).or_insert(0);
        *count = (*count).max(index + 1);
    }
    counts
}

fn scan(records: &[SegmentRecord], strategy: ScanStrategy, page_size: usize) -> ScanOutcome {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let store = Arc::new(InMemorySegmentStore::new());
        store.create_collection("docs").await;
        store.insert("docs", records.iter().cloned()).await;
        let config =
            ScanConfig::builder().page_size(page_size).embedding_dimensions(8).build().unwrap();
        let service = ListSourcesService::with_strategy(store, strategy, config).unwrap();
        service.scan("docs").await.unwrap()
    })
}

fn counts_of(outcome: &ScanOutcome) -> BTreeMap<String, u64> {
    outcome.summaries.iter().map(|s| (s.key.clone(), s.segment_count)).collect()
}

/// Orders and filters on the raw `(datetime, index, id)` fields, as a
/// string-typed search index does.
struct StringOrderedIndex(Vec<SegmentRecord>);

fn raw_key(record: &SegmentRecord) -> (String, i64, String) {
    (
        record.metadata.str_field(fields::INGESTION_DATETIME).unwrap_or_default(),
        record.metadata.int_field(fields::INDEX).unwrap_or_default(),
        record.embedding_id.clone(),
    )
}

#[async_trait]
impl FilteredQueryScan for StringOrderedIndex {
    async fn query(
        &self,
        _collection: &str,
        query: &KeysetQuery,
    ) -> embedscan::Result<Vec<SegmentRecord>> {
        let after = query
            .after
            .as_ref()
            .map(|b| (b.ingestion_datetime.clone(), b.index, b.embedding_id.clone()));
        let mut rows: Vec<SegmentRecord> = self
            .0
            .iter()
            .filter(|r| after.as_ref().is_none_or(|after| raw_key(r) > *after))
            .cloned()
            .collect();
        rows.sort_by_key(raw_key);
        rows.truncate(query.limit);
        Ok(rows)
    }
}

struct KeysetWalk {
    boundaries: Vec<Option<KeysetBoundary>>,
    ids: Vec<String>,
    termination: Termination,
}

/// Fetch keyset pages until the cursor stops, recording each boundary.
async fn walk_keyset(store: Arc<dyn FilteredQueryScan>, page_size: usize) -> KeysetWalk {
    let cursor = KeysetCursor::new(store, "docs", page_size, 8);
    let mut state = cursor.initial_state();
    let mut walk = KeysetWalk {
        boundaries: vec![None],
        ids: Vec::new(),
        termination: Termination::Exhausted,
    };
    loop {
        let page = cursor.fetch(&state).await.unwrap();
        walk.ids.extend(page.records.iter().map(|r| r.embedding_id.clone()));
        walk.boundaries.push(page.next_state.boundary.clone());
        state = page.next_state;
        if let Some(termination) = page.termination {
            walk.termination = termination;
            return walk;
        }
    }
}

/// *For any* set of well-formed segments, each strategy and page size yields
/// one summary per key whose count is `1 + max(index)` for that key, and
/// finishes within `ceil(R / P) + 1` fetches.
mod prop_strategies_agree {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn every_strategy_matches_the_unpaged_fold(
            specs in proptest::collection::vec(arb_segment(), 0..60),
            page_size in prop_oneof![Just(1usize), Just(2), Just(10), Just(1000)],
        ) {
            let records = build_records(&specs);
            let expected = expected_counts(&records);

            for strategy in STRATEGIES {
                let outcome = scan(&records, strategy, page_size);

                prop_assert_eq!(counts_of(&outcome), expected.clone(), "{}", strategy);
                prop_assert_eq!(outcome.report.termination, Termination::Exhausted);
                prop_assert_eq!(outcome.report.records, records.len());

                let bound = records.len().div_ceil(page_size) + 1;
                prop_assert!(
                    outcome.report.pages <= bound,
                    "{} took {} pages for {} records at page size {}",
                    strategy, outcome.report.pages, records.len(), page_size
                );
            }
        }

        #[test]
        fn merge_is_insensitive_to_arrival_order(
            specs in proptest::collection::vec(arb_segment(), 1..40),
            seed in any::<u64>(),
        ) {
            let records = build_records(&specs);

            let mut forward = SourceRecordMerger::new();
            forward.merge_all(&records);

            let mut shuffled = records.clone();
            let len = shuffled.len();
            for i in 0..len {
                let j = (seed.wrapping_mul(i as u64 + 1).wrapping_add(7) % len as u64) as usize;
                shuffled.swap(i, j);
            }
            let mut backward = SourceRecordMerger::new();
            backward.merge_all(shuffled.iter().rev());

            let counts = |m: SourceRecordMerger| -> Vec<(String, u64)> {
                m.into_summaries().into_iter().map(|s| (s.key, s.segment_count)).collect()
            };
            prop_assert_eq!(counts(forward), counts(backward));
        }

        #[test]
        fn keyset_boundaries_never_move_backwards(
            specs in proptest::collection::vec(arb_segment(), 1..40),
            page_size in 1usize..8,
        ) {
            let records = build_records(&specs);
            let memory = InMemorySegmentStore::new();
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(memory.insert("docs", records.iter().cloned()));

            let stores: [Arc<dyn FilteredQueryScan>; 2] =
                [Arc::new(memory), Arc::new(StringOrderedIndex(records.clone()))];
            for store in stores {
                let walk = rt.block_on(walk_keyset(store, page_size));

                prop_assert_eq!(walk.termination, Termination::Exhausted);
                for pair in walk.boundaries.windows(2) {
                    prop_assert!(pair[1] >= pair[0], "{:?} moved back from {:?}", pair[1], pair[0]);
                }
                let mut seen = walk.ids.clone();
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), records.len());
            }
        }
    }
}

#[test]
fn empty_collection_lists_nothing_for_every_strategy() {
    for strategy in STRATEGIES {
        let outcome = scan(&[], strategy, 10);
        assert!(outcome.summaries.is_empty(), "{strategy}");
        assert_eq!(outcome.report.pages, 1, "{strategy}");
    }
}
