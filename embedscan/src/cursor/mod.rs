//! Pagination cursors.
//!
//! A cursor turns one backend paging primitive into the uniform
//! `fetch(state) -> (records, next_state, exhausted)` contract consumed by
//! [`ScanDriver`](crate::driver::ScanDriver). Cursors are stateless between
//! calls: everything needed to resume lives in the associated `State`, which
//! the driver owns. A failed fetch therefore leaves the previous state intact.

mod counted;
mod iterator;
mod keyset;
mod offset;

use async_trait::async_trait;

use crate::backend::ScanStrategy;
use crate::error::Result;
use crate::metadata::SegmentRecord;

pub use counted::{CountThenOffsetCursor, CountedState};
pub use iterator::{NativeIteratorCursor, ScrollState};
pub use keyset::{KeysetBoundary, KeysetCursor, KeysetState};
pub use offset::{OffsetCursor, OffsetState};

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The backend has no further records.
    Exhausted,
    /// The keyset cursor stopped because a page made no progress.
    LivelockGuard,
}

/// One fetched page and the state to resume from.
#[derive(Debug, Clone)]
pub struct Page<S> {
    /// Records in this page, in backend order.
    pub records: Vec<SegmentRecord>,
    /// State to pass to the next fetch.
    pub next_state: S,
    /// `Some` when this was the last page.
    pub termination: Option<Termination>,
}

impl<S> Page<S> {
    /// Whether the scan is finished after this page.
    pub fn exhausted(&self) -> bool {
        self.termination.is_some()
    }
}

/// A resumable, paged view over the segments of one store.
#[async_trait]
pub trait PaginationCursor: Send + Sync {
    /// Resume point between fetches.
    type State: Clone + std::fmt::Debug + Send + Sync;

    /// The strategy this cursor implements.
    fn strategy(&self) -> ScanStrategy;

    /// State before the first fetch.
    fn initial_state(&self) -> Self::State;

    /// Fetch the page following `state`.
    async fn fetch(&self, state: &Self::State) -> Result<Page<Self::State>>;

    /// Release any server-side resource referenced by `state`.
    async fn release(&self, _state: &Self::State) -> Result<()> {
        Ok(())
    }
}

/// Termination rule shared by the offset-based cursors.
fn short_page(returned: usize, page_size: usize) -> Option<Termination> {
    (returned == 0 || returned < page_size).then_some(Termination::Exhausted)
}
