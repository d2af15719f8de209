//! Merge-max folding of segment records into source summaries.

use std::collections::BTreeMap;

use tracing::{trace, warn};

use crate::key::resolve_key;
use crate::metadata::{SegmentRecord, fields};
use crate::source::SourceSummary;

/// What [`SourceRecordMerger::merge`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First segment seen for its key.
    Inserted,
    /// The record carried a higher index and replaced the stored summary.
    Replaced,
    /// The stored summary already had an equal or higher count.
    Kept,
    /// `index` was missing, unparsable, or negative.
    SkippedMalformed,
    /// The record could not be attributed to a source.
    SkippedEmptyKey,
}

/// Counters of merge outcomes over one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records that started a new source.
    pub inserted: usize,
    /// Records that raised a source's segment count.
    pub replaced: usize,
    /// Records that left an existing source unchanged.
    pub kept: usize,
    /// Records dropped for a missing or invalid `index`.
    pub skipped_malformed: usize,
    /// Records with no source key.
    pub skipped_empty_key: usize,
}

impl MergeStats {
    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Replaced => self.replaced += 1,
            MergeOutcome::Kept => self.kept += 1,
            MergeOutcome::SkippedMalformed => self.skipped_malformed += 1,
            MergeOutcome::SkippedEmptyKey => self.skipped_empty_key += 1,
        }
    }
}

/// Folds segment records into at most one [`SourceSummary`] per key.
///
/// Only the segment with the greatest index knows the true segment count of
/// its source, and segments arrive in arbitrary order across pages, so a
/// stored summary is replaced only by a record with a strictly larger count.
/// One merger belongs to exactly one scan.
#[derive(Debug, Default)]
pub struct SourceRecordMerger {
    summaries: BTreeMap<String, SourceSummary>,
    stats: MergeStats,
}

impl SourceRecordMerger {
    /// Create an empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the summary map.
    pub fn merge(&mut self, record: &SegmentRecord) -> MergeOutcome {
        let outcome = self.merge_inner(record);
        self.stats.record(outcome);
        outcome
    }

    fn merge_inner(&mut self, record: &SegmentRecord) -> MergeOutcome {
        let Some(index) = record.metadata.int_field(fields::INDEX).filter(|i| *i >= 0) else {
            warn!(
                embedding_id = %record.embedding_id,
                index = ?record.metadata.get(fields::INDEX),
                "skipping segment without a usable index"
            );
            return MergeOutcome::SkippedMalformed;
        };

        let key = resolve_key(&record.metadata);
        if key.is_empty() {
            trace!(embedding_id = %record.embedding_id, "skipping segment with no source key");
            return MergeOutcome::SkippedEmptyKey;
        }

        let candidate = index as u64 + 1;
        match self.summaries.get(&key) {
            Some(existing) if candidate <= existing.segment_count => MergeOutcome::Kept,
            Some(_) => {
                let summary =
                    SourceSummary::from_metadata(key.clone(), candidate, &record.metadata);
                self.summaries.insert(key, summary);
                MergeOutcome::Replaced
            }
            None => {
                let summary =
                    SourceSummary::from_metadata(key.clone(), candidate, &record.metadata);
                self.summaries.insert(key, summary);
                MergeOutcome::Inserted
            }
        }
    }

    /// Fold a whole page.
    pub fn merge_all<'a>(&mut self, records: impl IntoIterator<Item = &'a SegmentRecord>) {
        for record in records {
            self.merge(record);
        }
    }

    /// Number of distinct sources merged so far.
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    /// Whether nothing has been merged.
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Look up the summary stored under a key.
    pub fn get(&self, key: &str) -> Option<&SourceSummary> {
        self.summaries.get(key)
    }

    /// Outcome counters so far.
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    /// Consume the merger, yielding summaries ordered by key.
    pub fn into_summaries(self) -> Vec<SourceSummary> {
        self.summaries.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn segment(id: &str, source_id: &str, index: i64, title: &str) -> SegmentRecord {
        SegmentRecord::new(
            id,
            Metadata::new()
                .with(fields::SOURCE_ID, source_id)
                .with(fields::INDEX, index)
                .with(fields::TITLE, title),
        )
    }

    #[test]
    fn keeps_highest_index_regardless_of_order() {
        let mut merger = SourceRecordMerger::new();
        assert_eq!(merger.merge(&segment("1", "a", 1, "one")), MergeOutcome::Inserted);
        assert_eq!(merger.merge(&segment("2", "a", 4, "four")), MergeOutcome::Replaced);
        assert_eq!(merger.merge(&segment("3", "a", 0, "zero")), MergeOutcome::Kept);
        assert_eq!(merger.merge(&segment("4", "a", 4, "again")), MergeOutcome::Kept);

        let summary = merger.get("a").unwrap();
        assert_eq!(summary.segment_count, 5);
        assert_eq!(summary.title.as_deref(), Some("four"));
    }

    #[test]
    fn malformed_and_unattributable_records_are_skipped() {
        let mut merger = SourceRecordMerger::new();
        let no_index = SegmentRecord::new("1", Metadata::new().with(fields::SOURCE_ID, "a"));
        let bad_index = SegmentRecord::new(
            "2",
            Metadata::new().with(fields::SOURCE_ID, "a").with(fields::INDEX, "first"),
        );
        let negative = segment("3", "a", -1, "neg");
        let orphan = SegmentRecord::new("4", Metadata::new().with(fields::INDEX, 0));

        assert_eq!(merger.merge(&no_index), MergeOutcome::SkippedMalformed);
        assert_eq!(merger.merge(&bad_index), MergeOutcome::SkippedMalformed);
        assert_eq!(merger.merge(&negative), MergeOutcome::SkippedMalformed);
        assert_eq!(merger.merge(&orphan), MergeOutcome::SkippedEmptyKey);
        assert!(merger.is_empty());

        let stats = merger.stats();
        assert_eq!(stats.skipped_malformed, 3);
        assert_eq!(stats.skipped_empty_key, 1);
    }

    #[test]
    fn summaries_come_out_ordered_by_key() {
        let mut merger = SourceRecordMerger::new();
        merger.merge_all(&[
            segment("1", "c", 0, ""),
            segment("2", "a", 0, ""),
            segment("3", "b", 2, ""),
        ]);
        let keys: Vec<_> = merger.into_summaries().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }
}
