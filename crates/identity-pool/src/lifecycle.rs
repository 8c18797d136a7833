//! Obtaining and renewing one identity's token pair
//!
//! Two paths:
//! - refresh: trade the stored refresh token for a new pair, no human needed
//! - interactive: show an authorize URL through the `CredentialResolver`,
//!   exchange the returned one-time code. Retried until it succeeds, the
//!   resolver closes or breaks, or the run is cancelled.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use harvest_auth::{
    AuthorizationPrompt, CredentialResolver, TokenExchange, build_authorization_url,
    generate_state,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::identity::Identity;

/// Exchanges of one code before giving up on it and prompting again.
pub const CODE_EXCHANGE_ATTEMPTS: u32 = 3;

/// Pause between exchanges of a code the token endpoint never answered.
pub const CODE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Unix seconds.
pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Token acquisition for identities, backed by the OAuth collaborators.
pub struct TokenLifecycle {
    exchange: Arc<dyn TokenExchange>,
    resolver: Arc<dyn CredentialResolver>,
    authorize_endpoint: String,
    client_id: String,
}

impl TokenLifecycle {
    pub fn new(
        exchange: Arc<dyn TokenExchange>,
        resolver: Arc<dyn CredentialResolver>,
        authorize_endpoint: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            resolver,
            authorize_endpoint: authorize_endpoint.into(),
            client_id: client_id.into(),
        }
    }

    /// Renew using the stored refresh token.
    pub async fn refresh(&self, identity: &mut Identity) -> Result<()> {
        let refresh_token = identity
            .refresh_token()
            .ok_or_else(|| Error::NoToken(identity.handle().to_string()))?
            .expose()
            .clone();
        let token = self.exchange.refresh(&refresh_token).await?;
        identity.accept(token, now_secs());
        info!(handle = identity.handle(), "token refreshed");
        Ok(())
    }

    /// Run the human-in-the-loop flow until a pair is accepted.
    ///
    /// Rejected input and rejected codes prompt again. A code that could not
    /// reach the token endpoint stays pending and is exchanged again after
    /// [`CODE_RETRY_DELAY`], up to [`CODE_EXCHANGE_ATTEMPTS`] times, so the
    /// human is not asked twice for a transport hiccup. Only a closed or
    /// broken resolver or cancellation ends the loop without a token.
    pub async fn authorize_interactive(
        &self,
        identity: &mut Identity,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut attempt: u32 = 0;
        let mut code_attempts: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;

            let code = match identity.pending_auth_code.take() {
                Some(code) => code,
                None => {
                    code_attempts = 0;
                    match self.prompt(identity, cancel).await? {
                        Some(code) => code,
                        None => continue,
                    }
                }
            };
            code_attempts += 1;

            let exchanged = self.exchange.exchange_code(code.expose()).await;
            match exchanged {
                Ok(token) => {
                    identity.accept(token, now_secs());
                    info!(handle = identity.handle(), attempt, "interactive authorization succeeded");
                    return Ok(());
                }
                Err(e @ harvest_auth::Error::Http(_)) if code_attempts < CODE_EXCHANGE_ATTEMPTS => {
                    warn!(handle = identity.handle(), attempt, code_attempts, error = %e, "token endpoint unreachable, retrying the same code");
                    identity.pending_auth_code = Some(code);
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(CODE_RETRY_DELAY) => {}
                    }
                }
                Err(e) => {
                    warn!(handle = identity.handle(), attempt, error = %e, "code exchange failed, prompting again");
                }
            }
        }
    }

    /// Ask the resolver for one code. `None` means the input was rejected
    /// and the caller should prompt again.
    async fn prompt(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<Option<Secret<String>>> {
        let state = generate_state();
        let url = build_authorization_url(&self.authorize_endpoint, &self.client_id, &state);
        let prompt = AuthorizationPrompt {
            authorize_url: &url,
            handle: identity.handle(),
            secret: identity.secret(),
            state: &state,
        };

        let resolved = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resolved = self.resolver.resolve(prompt) => resolved,
        };
        match resolved {
            Ok(code) => Ok(Some(Secret::new(code))),
            Err(e) if e.is_terminal() => Err(Error::ResolverClosed(e.to_string())),
            Err(e) => {
                warn!(handle = identity.handle(), error = %e, "authorization input rejected, prompting again");
                Ok(None)
            }
        }
    }
}
