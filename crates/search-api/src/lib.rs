//! Search API seam for the resume harvester
//!
//! Everything the scheduler needs to know about the paginated search endpoint
//! lives here: the half-open `TimeWindow` it queries, the `FetchQuery` shape
//! (count-only or a specific page), the exact timestamp rendering the API
//! expects, the `SearchTransport` trait that performs one HTTP round-trip, and
//! `classify_response` which turns a raw response into a typed `Attempt` the
//! retry dispatcher can match exhaustively.
//!
//! The transport never retries and never touches identity state. Retry,
//! backoff and identity rotation belong to the harvester crate.

pub mod classify;
pub mod error;
pub mod query;
pub mod transport;
pub mod window;

pub use classify::{AUTH_ERROR_VALUES, Attempt, SearchPayload, classify_response};
pub use error::{Error, Result};
pub use query::FetchQuery;
pub use transport::{
    DEFAULT_SEARCH_ENDPOINT, HttpSearchTransport, RawResponse, RequestAuth, SearchTransport,
};
pub use window::{TimeWindow, TimestampZone};
