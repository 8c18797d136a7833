//! Logical fetch queries

use std::fmt;

use crate::error::Result;
use crate::window::{TimeWindow, TimestampZone};

/// One logical fetch: a count probe when `page` is `None`, otherwise one page.
///
/// A page query carries its page size, so whoever computes the page count
/// also decides how the API slices the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchQuery {
    pub window: TimeWindow,
    pub page: Option<u32>,
    per_page: Option<u32>,
}

impl FetchQuery {
    /// Count-only query for a window.
    pub fn count(window: TimeWindow) -> Self {
        Self {
            window,
            page: None,
            per_page: None,
        }
    }

    /// Query for page `page` (zero-based) of a window, `per_page` items each.
    pub fn page(window: TimeWindow, page: u32, per_page: u32) -> Self {
        Self {
            window,
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    pub fn is_count(&self) -> bool {
        self.page.is_none()
    }

    /// Page size of a page query; `None` for count queries.
    pub fn per_page(&self) -> Option<u32> {
        self.per_page
    }

    /// Query-string parameters in the order the API documents them.
    pub fn params(&self, zone: TimestampZone) -> Result<Vec<(&'static str, String)>> {
        let mut params = vec![
            ("date_from", zone.render(self.window.start())?),
            ("date_to", zone.render(self.window.end())?),
        ];
        if let (Some(page), Some(per_page)) = (self.page, self.per_page) {
            params.push(("per_page", per_page.to_string()));
            params.push(("page", page.to_string()));
        }
        Ok(params)
    }
}

impl fmt::Display for FetchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "page {page} of {}", self.window),
            None => write!(f, "count of {}", self.window),
        }
    }
}
