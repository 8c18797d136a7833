//! Error types for identity pool operations

/// Errors from bootstrapping, refreshing or rotating identities.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("identity pool is empty")]
    Empty,

    /// No identity can be made to work any more. Callers treat this as a
    /// fatal connection condition.
    #[error("identity pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("credential resolver closed: {0}")]
    ResolverClosed(String),

    #[error("no identity at index {index} in a pool of {len}")]
    UnknownIdentity { index: usize, len: usize },

    #[error("identity {0} has no access token")]
    NoToken(String),

    #[error("authorization cancelled")]
    Cancelled,

    #[error(transparent)]
    Auth(#[from] harvest_auth::Error),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
