//! Error types for the harvest core

use search_api::TimeWindow;

/// A logical fetch that could not be completed.
///
/// Transient and authorization failures never appear here; the fetcher
/// absorbs them.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fatal connection error: {0}")]
    FatalConnection(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl From<identity_pool::Error> for FetchError {
    fn from(e: identity_pool::Error) -> Self {
        match e {
            identity_pool::Error::Cancelled => FetchError::Cancelled,
            other => FetchError::FatalConnection(other.to_string()),
        }
    }
}

/// Errors that end a harvest run.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("fatal connection error, {uncovered} not harvested: {reason}")]
    FatalConnection { uncovered: TimeWindow, reason: String },

    #[error("harvest cancelled, {uncovered} not harvested")]
    Cancelled { uncovered: TimeWindow },
}

/// Persistence failure for one batch.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serializing record {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A raw record that does not fit the resume projection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("field `{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}
