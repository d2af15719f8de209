//! Backend-agnostic scan loop.
//!
//! The driver repeats fetch, merge, and advance until the cursor reports the
//! last page:
//!
//! ```text
//! START -> FETCHING -> MERGING -> ADVANCE -> (FETCHING | DONE | ERROR)
//! ```
//!
//! Any fetch error ends the scan and drops everything merged so far. The
//! cursor state is released on both terminal transitions.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::backend::ScanStrategy;
use crate::cursor::{PaginationCursor, Termination};
use crate::error::Result;
use crate::merge::{MergeStats, SourceRecordMerger};
use crate::source::SourceSummary;

/// Counters describing a completed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Strategy the scan ran with.
    pub strategy: ScanStrategy,
    /// Number of fetch calls issued.
    pub pages: usize,
    /// Number of segment records received.
    pub records: usize,
    /// Merge outcome counters.
    pub merge: MergeStats,
    /// Why the scan stopped.
    pub termination: Termination,
}

/// Summaries produced by a completed scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// One summary per source, ordered by key.
    pub summaries: Vec<SourceSummary>,
    /// Counters for the scan that produced them.
    pub report: ScanReport,
}

/// Runs one scan to completion over a single cursor.
///
/// The driver owns the cursor state and the merger for the duration of the
/// scan; nothing is shared between scans.
pub struct ScanDriver<C: PaginationCursor> {
    cursor: C,
    label: String,
}

impl<C: PaginationCursor> ScanDriver<C> {
    /// Create a driver. `label` names the scanned store in logs.
    pub fn new(cursor: C, label: impl Into<String>) -> Self {
        Self { cursor, label: label.into() }
    }

    /// Scan until the cursor reports the last page.
    pub async fn run(self) -> Result<ScanOutcome> {
        let started = Instant::now();
        let strategy = self.cursor.strategy();
        let mut state = self.cursor.initial_state();
        let mut merger = SourceRecordMerger::new();
        let mut pages = 0usize;
        let mut records = 0usize;

        let termination = loop {
            let page = match self.cursor.fetch(&state).await {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        store = %self.label,
                        %strategy,
                        page = pages,
                        error = %e,
                        "page fetch failed"
                    );
                    self.release(&state).await;
                    return Err(e);
                }
            };
            pages += 1;
            records += page.records.len();

            merger.merge_all(&page.records);
            debug!(
                store = %self.label,
                page = pages,
                records = page.records.len(),
                sources = merger.len(),
                "merged page"
            );

            state = page.next_state;
            if let Some(termination) = page.termination {
                break termination;
            }
        };

        self.release(&state).await;

        let report = ScanReport { strategy, pages, records, merge: merger.stats(), termination };
        match termination {
            Termination::Exhausted => info!(
                store = %self.label,
                %strategy,
                pages,
                records,
                sources = merger.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "scan complete"
            ),
            Termination::LivelockGuard => warn!(
                store = %self.label,
                %strategy,
                pages,
                records,
                sources = merger.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "scan stopped by livelock guard before the backend reported exhaustion"
            ),
        }

        Ok(ScanOutcome { summaries: merger.into_summaries(), report })
    }

    async fn release(&self, state: &C::State) {
        if let Err(e) = self.cursor.release(state).await {
            warn!(store = %self.label, error = %e, "failed to release cursor");
        }
    }
}
