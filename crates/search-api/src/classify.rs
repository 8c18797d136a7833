//! Response classification for the retry dispatcher
//!
//! Maps a raw HTTP response onto one of four outcomes:
//! - `Success`: 2xx with the field the query asked for (`found` or `items`)
//! - `AuthFailure`: 403 whose `value` names a token problem; rotate and retry
//! - `FatalFailure`: any other 403 value; never retried
//! - `TransientFailure`: everything else (5xx, 4xx other than 403, bad JSON)

use serde::Deserialize;
use serde_json::Value;

use crate::query::FetchQuery;
use crate::transport::RawResponse;

/// 403 `value`s that mean "this identity's token is no good", not "you may
/// never do this".
pub const AUTH_ERROR_VALUES: &[&str] = &["bad_authorization", "token_expired", "token_revoked"];

/// Successful payload, shaped by the query kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPayload {
    Count(u64),
    Page(Vec<Value>),
}

/// Classified outcome of one HTTP attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Success(SearchPayload),
    AuthFailure(String),
    TransientFailure(String),
    FatalFailure(String),
}

#[derive(Deserialize)]
struct SearchBody {
    found: Option<u64>,
    items: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct ForbiddenBody {
    value: Option<String>,
    #[serde(default)]
    errors: Vec<ForbiddenDetail>,
}

#[derive(Deserialize)]
struct ForbiddenDetail {
    value: Option<String>,
}

/// Classify a response for the given query.
pub fn classify_response(query: &FetchQuery, response: &RawResponse) -> Attempt {
    match response.status {
        200..=299 => classify_success(query, &response.body),
        403 => classify_forbidden(&response.body),
        status => Attempt::TransientFailure(format!(
            "search endpoint returned {status}: {}",
            truncate(&response.body)
        )),
    }
}

fn classify_success(query: &FetchQuery, body: &str) -> Attempt {
    let parsed: SearchBody = match serde_json::from_str(body) {
        Ok(b) => b,
        Err(e) => return Attempt::TransientFailure(format!("malformed search body: {e}")),
    };
    match (query.is_count(), parsed.found, parsed.items) {
        (true, Some(found), _) => Attempt::Success(SearchPayload::Count(found)),
        (false, _, Some(items)) => Attempt::Success(SearchPayload::Page(items)),
        (true, None, _) => Attempt::TransientFailure("search body has no `found` count".into()),
        (false, _, None) => Attempt::TransientFailure("search body has no `items` array".into()),
    }
}

/// 403 bodies carry the reason either at the top level (`{"value": ...}`) or
/// inside an `errors` array.
fn classify_forbidden(body: &str) -> Attempt {
    let parsed: ForbiddenBody = match serde_json::from_str(body) {
        Ok(b) => b,
        Err(e) => return Attempt::TransientFailure(format!("malformed 403 body: {e}")),
    };
    let value = parsed
        .value
        .or_else(|| parsed.errors.into_iter().find_map(|d| d.value))
        .unwrap_or_default();

    if AUTH_ERROR_VALUES.contains(&value.as_str()) {
        Attempt::AuthFailure(value)
    } else {
        Attempt::FatalFailure(if value.is_empty() {
            "403 without a reason value".into()
        } else {
            value
        })
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
