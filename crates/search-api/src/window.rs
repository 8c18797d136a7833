//! Half-open time windows and API timestamp rendering
//!
//! A `TimeWindow` is `[start, end)` in unix seconds with `start < end`. Windows
//! are immutable: bisection and chunking derive new windows, never mutate.

use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// The search API's date format: wall-clock time with a literal `+0000`
/// suffix. The suffix is not an offset conversion; the rendered time is
/// whatever zone `TimestampZone` selects.
const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+0000";

/// Half-open `[start, end)` range of unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeWindow {
    start: i64,
    end: i64,
}

impl TimeWindow {
    /// Create a window, rejecting empty or inverted ranges.
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    /// Width of the window in seconds (always positive).
    pub fn len_secs(&self) -> i64 {
        self.end - self.start
    }

    /// Split at the floored midpoint into `[start, mid)` and `[mid, end)`.
    ///
    /// Returns `None` for a one-second window, which has no non-empty halves.
    pub fn bisect(&self) -> Option<(TimeWindow, TimeWindow)> {
        if self.len_secs() < 2 {
            return None;
        }
        let mid = self.start + self.len_secs() / 2;
        Some((
            TimeWindow {
                start: self.start,
                end: mid,
            },
            TimeWindow {
                start: mid,
                end: self.end,
            },
        ))
    }

    /// Consecutive sub-windows no wider than `ceiling_secs`, in ascending order.
    /// The last chunk is clipped to `end`.
    pub fn chunks(&self, ceiling_secs: i64) -> Chunks {
        Chunks {
            cursor: self.start,
            end: self.end,
            ceiling: ceiling_secs.max(1),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            DateTime::<Utc>::from_timestamp(self.start, 0),
            DateTime::<Utc>::from_timestamp(self.end, 0),
        ) {
            (Some(s), Some(e)) => write!(
                f,
                "[{}, {})",
                s.format("%Y-%m-%dT%H:%M:%SZ"),
                e.format("%Y-%m-%dT%H:%M:%SZ")
            ),
            _ => write!(f, "[{}, {})", self.start, self.end),
        }
    }
}

/// Iterator returned by [`TimeWindow::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks {
    cursor: i64,
    end: i64,
    ceiling: i64,
}

impl Iterator for Chunks {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<TimeWindow> {
        if self.cursor >= self.end {
            return None;
        }
        let start = self.cursor;
        let end = start.saturating_add(self.ceiling).min(self.end);
        self.cursor = end;
        Some(TimeWindow { start, end })
    }
}

/// Which wall clock the API timestamps are rendered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampZone {
    /// Host local time with a literal `+0000` suffix (the API's historical contract)
    #[default]
    Local,
    Utc,
}

impl TimestampZone {
    /// Render unix seconds as `YYYY-MM-DDTHH:MM:SS+0000`.
    pub fn render(&self, secs: i64) -> Result<String> {
        let utc =
            DateTime::<Utc>::from_timestamp(secs, 0).ok_or(Error::TimestampOutOfRange(secs))?;
        let rendered = match self {
            TimestampZone::Local => utc
                .with_timezone(&Local)
                .format(API_TIMESTAMP_FORMAT)
                .to_string(),
            TimestampZone::Utc => utc.format(API_TIMESTAMP_FORMAT).to_string(),
        };
        Ok(rendered)
    }
}
