//! HTTP transport for the search endpoint
//!
//! One call, one round-trip. Non-2xx statuses are returned as data, not as
//! errors; only failures to obtain a response at all (DNS, connect, timeout,
//! body read) become `Error::Transport`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::FetchQuery;
use crate::window::TimestampZone;

/// Resume search endpoint
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.hh.ru/resumes";

/// Status and body of one HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Per-request authorization supplied by the identity pool.
#[derive(Debug, Clone)]
pub struct RequestAuth {
    pub handle: String,
    pub access_token: Secret<String>,
    pub user_agent: String,
}

/// Performs one search request. Implementations must not retry.
///
/// Uses `Pin<Box<dyn Future>>` return types so the fetcher can hold an
/// `Arc<dyn SearchTransport>`.
pub trait SearchTransport: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a FetchQuery,
        auth: &'a RequestAuth,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>>;
}

/// reqwest-backed transport.
pub struct HttpSearchTransport {
    client: reqwest::Client,
    endpoint: String,
    zone: TimestampZone,
    timeout: Duration,
}

impl HttpSearchTransport {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        zone: TimestampZone,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            zone,
            timeout,
        }
    }
}

impl SearchTransport for HttpSearchTransport {
    fn search<'a>(
        &'a self,
        query: &'a FetchQuery,
        auth: &'a RequestAuth,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>> {
        Box::pin(async move {
            let params = query.params(self.zone)?;
            debug!(%query, handle = %auth.handle, "sending search request");

            let response = self
                .client
                .get(&self.endpoint)
                .query(&params)
                .bearer_auth(auth.access_token.expose())
                .header(reqwest::header::USER_AGENT, &auth.user_agent)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| Error::Transport(format!("search request failed: {e}")))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| Error::Transport(format!("reading search body failed: {e}")))?;

            Ok(RawResponse { status, body })
        })
    }
}
