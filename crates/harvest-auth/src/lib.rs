//! OAuth authorization-code flow for harvester identities
//!
//! Provides everything the identity pool needs to obtain and renew bearer
//! tokens without knowing how they are obtained:
//!
//! 1. `authorize::build_authorization_url()` with a random CSRF `state`
//! 2. A `CredentialResolver` shows that URL to a human and returns the
//!    one-time code (the console resolver reads the redirected URL from stdin)
//! 3. `TokenExchange::exchange_code()` trades the code for a token pair
//! 4. `TokenExchange::refresh()` renews a pair from its refresh token
//! 5. `TokenCache` persists pairs across runs so bootstrap can skip step 2
//!
//! Identities themselves come from a `handle:secret` credential list loaded
//! once at startup (`credentials::load_credential_list`).

pub mod authorize;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod resolver;
pub mod token;

pub use authorize::{build_authorization_url, extract_code, generate_state};
pub use constants::*;
pub use credentials::{CachedToken, CredentialEntry, TokenCache, load_credential_list};
pub use error::{Error, Result};
pub use resolver::{AuthorizationPrompt, ConsoleResolver, CredentialResolver};
pub use token::{HttpTokenExchange, TokenExchange, TokenResponse};
