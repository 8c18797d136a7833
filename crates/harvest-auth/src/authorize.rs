//! Authorization URL construction and redirect parsing
//!
//! The human opens the authorize URL, logs in as the identity, and is
//! redirected to the application's callback with `?code=...&state=...`.
//! They paste that redirected URL (or just the code) back to the harvester.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;

use crate::error::{Error, Result};

/// Generate a random opaque `state` value for CSRF protection.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorize URL for the code grant.
pub fn build_authorization_url(endpoint: &str, client_id: &str, state: &str) -> String {
    format!("{endpoint}?response_type=code&client_id={client_id}&state={state}")
}

/// Pull the one-time code out of whatever the human pasted.
///
/// Accepts a full redirected URL, a bare query string, or the bare code.
/// When the pasted URL carries a `state`, it must equal `expected_state`.
pub fn extract_code(input: &str, expected_state: Option<&str>) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidCode("empty input".into()));
    }

    if !input.contains('=') {
        if input.chars().any(char::is_whitespace) {
            return Err(Error::InvalidCode(format!("not a code or URL: {input}")));
        }
        return Ok(input.to_string());
    }

    let query = input.split_once('?').map_or(input, |(_, q)| q);
    let query = query.split('#').next().unwrap_or_default();

    let mut code = None;
    let mut state = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("code", v)) if !v.is_empty() => code = Some(v.to_string()),
            Some(("state", v)) => state = Some(v.to_string()),
            Some(("error", v)) => return Err(Error::AuthorizationDenied(v.to_string())),
            _ => {}
        }
    }

    if let (Some(expected), Some(actual)) = (expected_state, state.as_deref()) {
        if expected != actual {
            return Err(Error::StateMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    code.ok_or_else(|| Error::InvalidCode(format!("no `code` parameter in {input}")))
}
