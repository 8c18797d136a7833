//! Capped leaf windows by recursive bisection
//!
//! The search API stops paginating past a fixed result cap, so a window is
//! only safe to page through when its count is within the cap. Windows over
//! the cap are split at the floored midpoint and both halves examined,
//! earlier half first. The traversal is an explicit stack so leaves come out
//! one at a time, in ascending time order, as the scheduler asks for them.
//!
//! A window no wider than the minimum granularity that is still over the cap
//! cannot be split further. It is emitted as a forced leaf with count
//! `cap - 1`: records beyond the cap in that window are not harvested.

use std::future::Future;
use std::pin::Pin;

use search_api::TimeWindow;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::metrics;

/// Source of result counts for windows.
pub trait CountProbe: Send {
    fn count<'a>(
        &'a mut self,
        window: TimeWindow,
    ) -> Pin<Box<dyn Future<Output = Result<u64, FetchError>> + Send + 'a>>;
}

/// How a leaf's count was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// The probed count is within the cap.
    Exact,
    /// Over the cap at minimum granularity; count is `cap - 1`.
    Forced,
}

impl LeafKind {
    pub fn label(&self) -> &'static str {
        match self {
            LeafKind::Exact => "exact",
            LeafKind::Forced => "forced",
        }
    }
}

/// A window ready for pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leaf {
    pub window: TimeWindow,
    pub count: u64,
    /// Number of bisections between the partitioned window and this leaf.
    pub depth: u32,
    pub kind: LeafKind,
}

/// Lazy leaf iterator over one window.
#[derive(Debug)]
pub struct Partitioner {
    cap: u64,
    min_granularity_secs: i64,
    pending: Vec<(TimeWindow, u32)>,
}

impl Partitioner {
    pub fn new(window: TimeWindow, cap: u64, min_granularity_secs: i64) -> Self {
        Self {
            cap,
            min_granularity_secs: min_granularity_secs.max(1),
            pending: vec![(window, 0)],
        }
    }

    /// Probe until the next leaf is found, or `None` when the window is
    /// exhausted.
    pub async fn next_leaf<P>(&mut self, probe: &mut P) -> Result<Option<Leaf>, FetchError>
    where
        P: CountProbe + ?Sized,
    {
        while let Some((window, depth)) = self.pending.pop() {
            let count = probe.count(window).await?;
            if count <= self.cap {
                debug!(%window, count, depth, "leaf window ready");
                metrics::record_leaf(LeafKind::Exact.label());
                return Ok(Some(Leaf {
                    window,
                    count,
                    depth,
                    kind: LeafKind::Exact,
                }));
            }

            let halves = if window.len_secs() > self.min_granularity_secs {
                window.bisect()
            } else {
                None
            };
            match halves {
                Some((left, right)) => {
                    debug!(%window, count, depth, "splitting window over cap");
                    self.pending.push((right, depth + 1));
                    self.pending.push((left, depth + 1));
                }
                None => {
                    let forced = self.cap.saturating_sub(1);
                    warn!(
                        %window,
                        count,
                        cap = self.cap,
                        harvested = forced,
                        "window over cap at minimum granularity, records beyond the cap are skipped"
                    );
                    metrics::record_leaf(LeafKind::Forced.label());
                    return Ok(Some(Leaf {
                        window,
                        count: forced,
                        depth,
                        kind: LeafKind::Forced,
                    }));
                }
            }
        }
        Ok(None)
    }
}
