//! Shared run progress
//!
//! The scheduler is the only writer. Clones are handed to the status server,
//! which reads a snapshot on each `/health` request.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};

use serde::Serialize;

/// Lifecycle of a harvest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunState::Running,
            2 => RunState::Completed,
            3 => RunState::Failed,
            4 => RunState::Cancelled,
            _ => RunState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Running => 1,
            RunState::Completed => 2,
            RunState::Failed => 3,
            RunState::Cancelled => 4,
        }
    }
}

#[derive(Default)]
struct Inner {
    state: AtomicU8,
    range_start: AtomicI64,
    range_end: AtomicI64,
    covered_until: AtomicI64,
    expected: AtomicU64,
    leaves: AtomicU64,
    pages: AtomicU64,
    records_stored: AtomicU64,
    records_rejected: AtomicU64,
    retries: AtomicU64,
}

/// Cheaply cloneable progress counters.
#[derive(Clone, Default)]
pub struct HarvestProgress {
    inner: Arc<Inner>,
}

/// Point-in-time view for the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub state: RunState,
    pub range_start: i64,
    pub range_end: i64,
    pub covered_until: i64,
    pub expected: u64,
    pub leaves: u64,
    pub pages: u64,
    pub records_stored: u64,
    pub records_rejected: u64,
    pub retries: u64,
}

impl HarvestProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn start(&self, start: i64, end: i64) {
        self.inner.range_start.store(start, Ordering::Relaxed);
        self.inner.range_end.store(end, Ordering::Relaxed);
        self.inner.covered_until.store(start, Ordering::Relaxed);
        self.set_state(RunState::Running);
    }

    pub(crate) fn set_state(&self, state: RunState) {
        self.inner.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn set_expected(&self, expected: u64) {
        self.inner.expected.store(expected, Ordering::Relaxed);
    }

    pub(crate) fn set_covered_until(&self, ts: i64) {
        self.inner.covered_until.store(ts, Ordering::Relaxed);
    }

    pub(crate) fn add_leaf(&self) {
        self.inner.leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_page(&self) {
        self.inner.pages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_records(&self, stored: u64, rejected: u64) {
        self.inner.records_stored.fetch_add(stored, Ordering::Relaxed);
        self.inner
            .records_rejected
            .fetch_add(rejected, Ordering::Relaxed);
    }

    pub(crate) fn add_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.inner.state.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let i = &self.inner;
        ProgressSnapshot {
            state: self.state(),
            range_start: i.range_start.load(Ordering::Relaxed),
            range_end: i.range_end.load(Ordering::Relaxed),
            covered_until: i.covered_until.load(Ordering::Relaxed),
            expected: i.expected.load(Ordering::Relaxed),
            leaves: i.leaves.load(Ordering::Relaxed),
            pages: i.pages.load(Ordering::Relaxed),
            records_stored: i.records_stored.load(Ordering::Relaxed),
            records_rejected: i.records_rejected.load(Ordering::Relaxed),
            retries: i.retries.load(Ordering::Relaxed),
        }
    }
}
