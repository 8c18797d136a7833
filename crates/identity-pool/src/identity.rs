//! One authenticatable account and its token state

use common::Secret;
use harvest_auth::{CachedToken, CredentialEntry, TokenResponse};

/// An identity from the credential list.
///
/// Token fields are only ever written by the pool. `token_issued_at` is unix
/// seconds at the moment a pair was accepted, never earlier.
#[derive(Debug)]
pub struct Identity {
    handle: String,
    secret: Secret<String>,
    access_token: Option<Secret<String>>,
    refresh_token: Option<Secret<String>>,
    token_issued_at: Option<u64>,
    token_lifetime_secs: Option<u64>,
    pub(crate) pending_auth_code: Option<Secret<String>>,
    pub(crate) revoked: bool,
}

impl Identity {
    pub fn new(handle: impl Into<String>, secret: Secret<String>) -> Self {
        Self {
            handle: handle.into(),
            secret,
            access_token: None,
            refresh_token: None,
            token_issued_at: None,
            token_lifetime_secs: None,
            pending_auth_code: None,
            revoked: false,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn secret(&self) -> &Secret<String> {
        &self.secret
    }

    pub fn access_token(&self) -> Option<&Secret<String>> {
        self.access_token.as_ref()
    }

    pub fn refresh_token(&self) -> Option<&Secret<String>> {
        self.refresh_token.as_ref()
    }

    pub fn token_issued_at(&self) -> Option<u64> {
        self.token_issued_at
    }

    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Whether the search API rejected this identity's token since it was
    /// last authorized.
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Purely time-based: `now - issued_at > lifetime`. An identity without
    /// a complete token record counts as expired.
    pub fn is_expired(&self, now: u64) -> bool {
        match (
            &self.access_token,
            self.token_issued_at,
            self.token_lifetime_secs,
        ) {
            (Some(_), Some(issued), Some(lifetime)) => now.saturating_sub(issued) > lifetime,
            _ => true,
        }
    }

    /// Replace the token pair with one just accepted at `now`.
    pub(crate) fn accept(&mut self, token: TokenResponse, now: u64) {
        self.access_token = Some(Secret::new(token.access_token));
        self.refresh_token = Some(Secret::new(token.refresh_token));
        self.token_issued_at = Some(now);
        self.token_lifetime_secs = Some(token.expires_in);
        self.pending_auth_code = None;
        self.revoked = false;
    }

    pub(crate) fn restore(&mut self, cached: &CachedToken) {
        self.access_token = Some(Secret::new(cached.access.clone()));
        self.refresh_token = Some(Secret::new(cached.refresh.clone()));
        self.token_issued_at = Some(cached.issued_at);
        self.token_lifetime_secs = Some(cached.lifetime_secs);
    }

    pub(crate) fn to_cached(&self) -> Option<CachedToken> {
        Some(CachedToken {
            access: self.access_token.as_ref()?.expose().clone(),
            refresh: self.refresh_token.as_ref()?.expose().clone(),
            issued_at: self.token_issued_at?,
            lifetime_secs: self.token_lifetime_secs?,
        })
    }
}

impl From<CredentialEntry> for Identity {
    fn from(entry: CredentialEntry) -> Self {
        Self::new(entry.handle, entry.secret)
    }
}
