//! OAuth token exchange and refresh
//!
//! Both operations POST a form to the token endpoint with different grant
//! types:
//! 1. `authorization_code`: first token pair for an identity
//! 2. `refresh_token`: renew an expiring pair without a human

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the moment the pair is accepted.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Token endpoint operations, behind a trait so the pool can be tested
/// without a network.
pub trait TokenExchange: Send + Sync {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;
}

/// reqwest-backed token endpoint client for a confidential OAuth application.
pub struct HttpTokenExchange {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: Secret<String>,
}

impl HttpTokenExchange {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    async fn post(&self, form: &[(&str, &str)], grant: &str) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{grant} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // 400 invalid_grant / 401 / 403: the code or refresh token is dead
            if matches!(status.as_u16(), 400 | 401 | 403) {
                return Err(Error::InvalidCredentials(format!(
                    "{grant} rejected ({status}): {body}"
                )));
            }
            return Err(Error::TokenExchange(format!(
                "{grant} returned {status}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid {grant} response: {e}")))
    }
}

impl TokenExchange for HttpTokenExchange {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.post(
                &[
                    ("grant_type", "authorization_code"),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.expose().as_str()),
                    ("code", code),
                ],
                "authorization_code",
            )
            .await
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.post(
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
                "refresh_token",
            )
            .await
        })
    }
}
