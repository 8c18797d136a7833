//! Test doubles for the search API, the OAuth collaborators and the sink.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use harvest_auth::{AuthorizationPrompt, CredentialEntry, CredentialResolver, TokenExchange, TokenResponse};
use identity_pool::{IdentityPool, RotationPolicy, TokenLifecycle};
use search_api::{FetchQuery, RawResponse, RequestAuth, SearchTransport, TimeWindow};
use serde_json::{Value, json};

use crate::error::SinkError;
use crate::record::ResumeRecord;
use crate::sink::RecordSink;

pub fn response(status: u16, body: &str) -> RawResponse {
    RawResponse {
        status,
        body: body.to_string(),
    }
}

/// (query, handle, access token, user agent) of one request.
pub type Call = (FetchQuery, String, String, String);

fn record_call(calls: &Mutex<Vec<Call>>, query: &FetchQuery, auth: &RequestAuth) {
    calls.lock().unwrap().push((
        *query,
        auth.handle.clone(),
        auth.access_token.expose().clone(),
        auth.user_agent.clone(),
    ));
}

/// Replays canned responses in order, then repeats `repeat` forever if set.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<RawResponse>>,
    repeat: Option<RawResponse>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<RawResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(response: RawResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl SearchTransport for ScriptedTransport {
    fn search<'a>(
        &'a self,
        query: &'a FetchQuery,
        auth: &'a RequestAuth,
    ) -> Pin<Box<dyn Future<Output = search_api::Result<RawResponse>> + Send + 'a>> {
        record_call(&self.calls, query, auth);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone());
        Box::pin(async move {
            Ok(next.unwrap_or_else(|| panic!("unexpected request: {query}")))
        })
    }
}

/// In-memory search API over a fixed population of record timestamps.
///
/// Count queries report the true number of records in the window; page
/// queries return records sorted by timestamp, sliced by the query's page
/// size. Canned `overrides` are served first, before the simulation answers.
pub struct FakeSearchApi {
    timestamps: Vec<i64>,
    overrides: Mutex<VecDeque<RawResponse>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeSearchApi {
    pub fn new(mut timestamps: Vec<i64>) -> Self {
        timestamps.sort_unstable();
        Self {
            timestamps,
            overrides: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `n` records spread evenly across `window`.
    pub fn spread(window: TimeWindow, n: usize) -> Vec<i64> {
        let step = window.len_secs() as f64 / n.max(1) as f64;
        (0..n)
            .map(|i| window.start() + (i as f64 * step) as i64)
            .collect()
    }

    pub fn push_override(&self, response: RawResponse) {
        self.overrides.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn page_calls(&self) -> Vec<(TimeWindow, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|(q, ..)| q.page.map(|p| (q.window, p)))
            .collect()
    }

    /// Index of the first record in `window` and the records themselves.
    fn in_window(&self, window: TimeWindow) -> (usize, &[i64]) {
        let lo = self.timestamps.partition_point(|&t| t < window.start());
        let hi = self.timestamps.partition_point(|&t| t < window.end());
        (lo, &self.timestamps[lo..hi])
    }

    fn answer(&self, query: &FetchQuery) -> RawResponse {
        let (offset, matching) = self.in_window(query.window);
        let body = match query.page {
            None => json!({ "found": matching.len() }),
            Some(page) => {
                let per_page = query.per_page().expect("page query without a page size") as usize;
                let items: Vec<Value> = matching
                    .iter()
                    .enumerate()
                    .skip(page as usize * per_page)
                    .take(per_page)
                    .map(|(i, &ts)| raw_resume(&format!("r{}", offset + i), ts))
                    .collect();
                json!({ "found": matching.len(), "items": items })
            }
        };
        response(200, &body.to_string())
    }
}

impl SearchTransport for FakeSearchApi {
    fn search<'a>(
        &'a self,
        query: &'a FetchQuery,
        auth: &'a RequestAuth,
    ) -> Pin<Box<dyn Future<Output = search_api::Result<RawResponse>> + Send + 'a>> {
        record_call(&self.calls, query, auth);
        let canned = self.overrides.lock().unwrap().pop_front();
        let answer = canned.unwrap_or_else(|| self.answer(query));
        Box::pin(async move { Ok(answer) })
    }
}

/// A raw search item that passes validation.
pub fn raw_resume(id: &str, ts: i64) -> Value {
    let created = chrono::DateTime::from_timestamp(ts, 0)
        .unwrap()
        .format("%Y-%m-%dT%H:%M:%S+0000")
        .to_string();
    json!({
        "id": id,
        "alternate_url": format!("https://hh.ru/resume/{id}"),
        "created_at": created,
        "updated_at": created,
        "age": 30,
        "title": "Engineer",
        "area": {"id": "1", "name": "Moscow"},
        "gender": {"id": "female"},
        "salary": null,
        "photo": null
    })
}

/// Issues `at_<code>` for any code.
pub struct StaticExchange;

impl TokenExchange for StaticExchange {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = harvest_auth::Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            Ok(TokenResponse {
                access_token: format!("at_{code}"),
                refresh_token: format!("rt_{code}"),
                expires_in: 1_209_600,
            })
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = harvest_auth::Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            Ok(TokenResponse {
                access_token: format!("at_{refresh_token}"),
                refresh_token: refresh_token.to_string(),
                expires_in: 1_209_600,
            })
        })
    }
}

/// Answers every prompt with `code_<handle>`.
pub struct EchoResolver;

impl CredentialResolver for EchoResolver {
    fn resolve<'a>(
        &'a self,
        prompt: AuthorizationPrompt<'a>,
    ) -> Pin<Box<dyn Future<Output = harvest_auth::Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(format!("code_{}", prompt.handle)) })
    }
}

pub fn pool_of(handles: &[&str]) -> IdentityPool {
    let entries = handles
        .iter()
        .map(|h| CredentialEntry {
            handle: h.to_string(),
            secret: "pw".into(),
        })
        .collect();
    let lifecycle = TokenLifecycle::new(
        Arc::new(StaticExchange),
        Arc::new(EchoResolver),
        "https://hh.ru/oauth/authorize",
        "APP",
    );
    IdentityPool::new(entries, lifecycle, RotationPolicy::OnFailure).unwrap()
}

/// Keeps every delivered batch; fails the batches whose index is listed.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<String>>>,
    fail_batches: Vec<usize>,
}

impl MemorySink {
    pub fn failing_on(fail_batches: Vec<usize>) -> Self {
        Self {
            fail_batches,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl RecordSink for MemorySink {
    fn upsert<'a>(
        &'a self,
        records: &'a [ResumeRecord],
    ) -> Pin<Box<dyn Future<Output = Result<u64, SinkError>> + Send + 'a>> {
        let mut batches = self.batches.lock().unwrap();
        let index = batches.len();
        batches.push(records.iter().map(|r| r.id.clone()).collect());
        let result = if self.fail_batches.contains(&index) {
            Err(SinkError::Database(sqlx::Error::PoolClosed))
        } else {
            Ok(records.len() as u64)
        };
        Box::pin(async move { result })
    }
}
