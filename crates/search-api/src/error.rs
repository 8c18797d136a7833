//! Error types for the search API seam

/// Errors from building or sending a search request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid time window: start {start} must be before end {end}")]
    InvalidWindow { start: i64, end: i64 },

    #[error("timestamp {0} is outside the representable range")]
    TimestampOutOfRange(i64),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result alias for search API operations.
pub type Result<T> = std::result::Result<T, Error>;
