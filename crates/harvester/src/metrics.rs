//! Harvest counters
//!
//! - `harvest_fetch_retries_total` (counter): label `cause` (`auth`, `transient`)
//! - `harvest_leaf_windows_total` (counter): label `kind` (`exact`, `forced`)
//! - `harvest_pages_total` (counter)
//! - `harvest_records_total` (counter): label `outcome` (`stored`, `rejected`, `failed`)
//!
//! Identity rotations and re-authorizations are counted by the identity pool.

/// Record one retry of a logical fetch.
pub fn record_retry(cause: &'static str) {
    metrics::counter!("harvest_fetch_retries_total", "cause" => cause).increment(1);
}

/// Record a leaf window handed to pagination.
pub fn record_leaf(kind: &'static str) {
    metrics::counter!("harvest_leaf_windows_total", "kind" => kind).increment(1);
}

/// Record one fetched page.
pub fn record_page() {
    metrics::counter!("harvest_pages_total").increment(1);
}

/// Record `count` records with the given outcome.
pub fn record_records(outcome: &'static str, count: u64) {
    if count > 0 {
        metrics::counter!("harvest_records_total", "outcome" => outcome).increment(count);
    }
}
