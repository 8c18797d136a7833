//! OAuth endpoint defaults
//!
//! Overridable from the `[api]` config section; these are the production
//! values of the resume search provider.

/// Authorization endpoint the human visits to approve the application
pub const DEFAULT_AUTHORIZE_ENDPOINT: &str = "https://hh.ru/oauth/authorize";

/// Token endpoint for code exchange and token refresh
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://hh.ru/oauth/token";
