//! Resilient single logical fetch
//!
//! One `fetch` call loops until the search API answers the query or a fatal
//! condition occurs:
//! 1. Sleep the current backoff delay (0 on the first attempt)
//! 2. Ask the identity pool for the active identity's token
//! 3. Send the request and classify the response
//! 4. Success resets the backoff; an auth failure rotates the pool; a
//!    transient failure just retries; a fatal failure is returned
//!
//! Retries are unbounded. Callers needing a bound cancel the token.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use identity_pool::IdentityPool;
use search_api::{Attempt, FetchQuery, RequestAuth, SearchPayload, SearchTransport, TimeWindow};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::BackoffState;
use crate::error::FetchError;
use crate::metrics;
use crate::partition::CountProbe;

/// Why an attempt is being retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryCause {
    /// The API rejected the token; the pool has rotated.
    Auth(String),
    Transient(String),
}

impl RetryCause {
    pub fn label(&self) -> &'static str {
        match self {
            RetryCause::Auth(_) => "auth",
            RetryCause::Transient(_) => "transient",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            RetryCause::Auth(d) | RetryCause::Transient(d) => d,
        }
    }
}

/// Emitted once per retry, before the backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub query: FetchQuery,
    /// 1-based count of failed attempts for this query.
    pub attempt: u32,
    pub delay: Duration,
    pub cause: RetryCause,
}

type RetryObserver = Box<dyn Fn(&RetryEvent) + Send + Sync>;

/// Fetch loop over one transport and one identity pool.
pub struct ResilientFetcher {
    transport: Arc<dyn SearchTransport>,
    pool: IdentityPool,
    backoff: BackoffState,
    user_agent: String,
    cancel: CancellationToken,
    on_retry: Option<RetryObserver>,
}

impl ResilientFetcher {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        pool: IdentityPool,
        user_agent: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            pool,
            backoff: BackoffState::new(),
            user_agent: user_agent.into(),
            cancel,
            on_retry: None,
        }
    }

    /// Register a callback invoked for every retry event.
    pub fn with_retry_observer(
        mut self,
        observer: impl Fn(&RetryEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Box::new(observer));
        self
    }

    pub fn pool(&self) -> &IdentityPool {
        &self.pool
    }

    pub fn backoff(&self) -> BackoffState {
        self.backoff
    }

    /// Run one logical fetch to completion.
    pub async fn fetch(&mut self, query: FetchQuery) -> Result<SearchPayload, FetchError> {
        let mut failures: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let credential = self.pool.authorize(&self.cancel).await?;
            let auth = RequestAuth {
                user_agent: format!("{} ({})", self.user_agent, credential.handle),
                handle: credential.handle,
                access_token: credential.access_token,
            };

            let attempt = match self.transport.search(&query, &auth).await {
                Ok(response) => search_api::classify_response(&query, &response),
                Err(e) => Attempt::TransientFailure(e.to_string()),
            };

            let cause = match attempt {
                Attempt::Success(payload) => {
                    if failures > 0 {
                        debug!(%query, failures, "fetch recovered");
                    }
                    self.backoff.reset();
                    self.pool.report_success();
                    return Ok(payload);
                }
                Attempt::FatalFailure(reason) => {
                    warn!(%query, handle = %auth.handle, reason = %reason, "fatal search response");
                    return Err(FetchError::FatalConnection(reason));
                }
                Attempt::AuthFailure(value) => {
                    self.pool.report_auth_failure(&value)?;
                    RetryCause::Auth(value)
                }
                Attempt::TransientFailure(reason) => RetryCause::Transient(reason),
            };

            failures += 1;
            let event = RetryEvent {
                query,
                attempt: failures,
                delay: self.backoff.delay(),
                cause,
            };
            self.emit(&event);

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(event.delay) => {}
            }
            self.backoff.record_failure();
        }
    }

    /// Number of records the API reports for `window`.
    pub async fn count(&mut self, window: TimeWindow) -> Result<u64, FetchError> {
        match self.fetch(FetchQuery::count(window)).await? {
            SearchPayload::Count(n) => Ok(n),
            SearchPayload::Page(_) => Err(FetchError::FatalConnection(
                "count query answered with a page".into(),
            )),
        }
    }

    /// Raw items of page `page` (zero-based) of `window`, `per_page` per page.
    pub async fn page(
        &mut self,
        window: TimeWindow,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, FetchError> {
        match self.fetch(FetchQuery::page(window, page, per_page)).await? {
            SearchPayload::Page(items) => Ok(items),
            SearchPayload::Count(_) => Err(FetchError::FatalConnection(
                "page query answered with a count".into(),
            )),
        }
    }

    fn emit(&self, event: &RetryEvent) {
        warn!(
            query = %event.query,
            attempt = event.attempt,
            delay_secs = event.delay.as_secs(),
            cause = event.cause.label(),
            detail = event.cause.detail(),
            "retrying fetch"
        );
        metrics::record_retry(event.cause.label());
        if let Some(observer) = &self.on_retry {
            observer(event);
        }
    }
}

impl CountProbe for ResilientFetcher {
    fn count<'a>(
        &'a mut self,
        window: TimeWindow,
    ) -> Pin<Box<dyn Future<Output = Result<u64, FetchError>> + Send + 'a>> {
        Box::pin(ResilientFetcher::count(self, window))
    }
}
