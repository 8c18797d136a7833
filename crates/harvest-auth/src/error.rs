//! Error types for OAuth operations

/// Errors from obtaining, renewing or storing tokens.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid authorization code input: {0}")]
    InvalidCode(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("authorization state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: String, actual: String },

    /// No more codes can ever be supplied (stdin closed, test script exhausted).
    #[error("credential resolver closed: {0}")]
    ResolverClosed(String),

    #[error("credential list parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether retrying the interactive flow can never succeed.
    ///
    /// A resolver that failed to read or write its terminal will fail the
    /// same way on the next prompt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::ResolverClosed(_) | Error::Io(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
