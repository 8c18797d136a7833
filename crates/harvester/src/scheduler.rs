//! Bounded-window ingestion
//!
//! `run(start, end)` harvests every record in `[start, end)`:
//! 1. Probe the whole range once and log the expected total
//! 2. Walk the range in sub-windows no wider than the interval ceiling
//! 3. Partition each sub-window into capped leaves, ascending
//! 4. Page through each leaf in page order, validating each page and handing
//!    the valid records to the sink
//!
//! Everything is sequential. A page that fails validation or persistence is
//! logged and skipped; only a fatal connection error or cancellation ends
//! the run early, and both report the range that was not covered.

use std::sync::Arc;

use search_api::TimeWindow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{FetchError, SchedulerError};
use crate::fetcher::ResilientFetcher;
use crate::metrics;
use crate::partition::{Leaf, LeafKind, Partitioner};
use crate::progress::{HarvestProgress, RunState};
use crate::record::ResumeRecord;
use crate::sink::RecordSink;

/// Partitioning and pagination parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Most results the API will page through for one query.
    pub result_cap: u64,
    pub page_size: u32,
    /// Widest sub-window handed to one partitioning pass.
    pub interval_ceiling_secs: i64,
    /// Windows this narrow are never split.
    pub min_granularity_secs: i64,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            result_cap: 2000,
            page_size: 100,
            interval_ceiling_secs: 2_592_000,
            min_granularity_secs: 1,
        }
    }
}

impl HarvestSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.result_cap == 0 {
            return Err("harvest.result_cap must be greater than 0".into());
        }
        if self.page_size == 0 {
            return Err("harvest.page_size must be greater than 0".into());
        }
        if u64::from(self.page_size) > self.result_cap {
            return Err(format!(
                "harvest.page_size ({}) must not exceed harvest.result_cap ({})",
                self.page_size, self.result_cap
            ));
        }
        if self.interval_ceiling_secs <= 0 {
            return Err("harvest.interval_ceiling_secs must be greater than 0".into());
        }
        if self.min_granularity_secs <= 0 {
            return Err("harvest.min_granularity_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Totals for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub expected: u64,
    pub sub_windows: u64,
    pub leaves: u64,
    pub forced_leaves: u64,
    pub pages: u64,
    pub records_stored: u64,
    pub records_rejected: u64,
    pub page_failures: u64,
}

/// Drives partitioning, pagination and delivery for one range.
pub struct IngestionScheduler {
    fetcher: ResilientFetcher,
    sink: Arc<dyn RecordSink>,
    settings: HarvestSettings,
    progress: HarvestProgress,
}

impl IngestionScheduler {
    /// The fetcher's retry events are counted into `progress`.
    pub fn new(
        fetcher: ResilientFetcher,
        sink: Arc<dyn RecordSink>,
        settings: HarvestSettings,
        progress: HarvestProgress,
    ) -> Self {
        let retries = progress.clone();
        let fetcher = fetcher.with_retry_observer(move |_| retries.add_retry());
        Self {
            fetcher,
            sink,
            settings,
            progress,
        }
    }

    pub fn progress(&self) -> &HarvestProgress {
        &self.progress
    }

    pub fn fetcher(&self) -> &ResilientFetcher {
        &self.fetcher
    }

    /// Harvest `[start, end)` (unix seconds).
    pub async fn run(&mut self, start: i64, end: i64) -> Result<RunReport, SchedulerError> {
        self.settings
            .validate()
            .map_err(SchedulerError::Configuration)?;
        let range = TimeWindow::new(start, end)
            .map_err(|e| SchedulerError::Configuration(e.to_string()))?;

        self.progress.start(start, end);
        let result = self.harvest(range).await;
        self.progress.set_state(match &result {
            Ok(_) => RunState::Completed,
            Err(SchedulerError::Cancelled { .. }) => RunState::Cancelled,
            Err(_) => RunState::Failed,
        });

        match &result {
            Ok(report) => info!(
                window = %range,
                expected = report.expected,
                leaves = report.leaves,
                forced_leaves = report.forced_leaves,
                pages = report.pages,
                stored = report.records_stored,
                rejected = report.records_rejected,
                page_failures = report.page_failures,
                "harvest complete"
            ),
            Err(e) => error!(window = %range, error = %e, "harvest halted"),
        }
        result
    }

    async fn harvest(&mut self, range: TimeWindow) -> Result<RunReport, SchedulerError> {
        let mut report = RunReport::default();
        let mut covered_until = range.start();

        let expected = self
            .fetcher
            .count(range)
            .await
            .map_err(|e| halt(e, range, covered_until))?;
        report.expected = expected;
        self.progress.set_expected(expected);
        info!(window = %range, expected, "expected records in range");

        for sub_window in range.chunks(self.settings.interval_ceiling_secs) {
            report.sub_windows += 1;
            info!(window = %sub_window, "partitioning sub-window");

            let mut partitioner = Partitioner::new(
                sub_window,
                self.settings.result_cap,
                self.settings.min_granularity_secs,
            );
            loop {
                let leaf = match partitioner.next_leaf(&mut self.fetcher).await {
                    Ok(Some(leaf)) => leaf,
                    Ok(None) => break,
                    Err(e) => return Err(halt(e, range, covered_until)),
                };
                self.harvest_leaf(&leaf, &mut report)
                    .await
                    .map_err(|e| halt(e, range, covered_until))?;

                covered_until = leaf.window.end();
                self.progress.set_covered_until(covered_until);
            }
        }

        Ok(report)
    }

    async fn harvest_leaf(&mut self, leaf: &Leaf, report: &mut RunReport) -> Result<(), FetchError> {
        report.leaves += 1;
        if leaf.kind == LeafKind::Forced {
            report.forced_leaves += 1;
        }
        self.progress.add_leaf();

        let pages = leaf.count.div_ceil(u64::from(self.settings.page_size));
        let pages = u32::try_from(pages).unwrap_or(u32::MAX);
        info!(window = %leaf.window, count = leaf.count, pages, kind = leaf.kind.label(), "harvesting leaf");

        for page in 0..pages {
            let items = self
                .fetcher
                .page(leaf.window, page, self.settings.page_size)
                .await?;
            report.pages += 1;
            self.progress.add_page();
            metrics::record_page();
            self.deliver(leaf.window, page, &items, report).await;
        }
        Ok(())
    }

    /// Validate and persist one page. Failures stay inside the page.
    async fn deliver(&self, window: TimeWindow, page: u32, items: &[Value], report: &mut RunReport) {
        let mut records = Vec::with_capacity(items.len());
        let mut rejected = 0u64;
        for item in items {
            match ResumeRecord::from_raw(item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    rejected += 1;
                    let id = item.get("id").and_then(Value::as_str).unwrap_or("<unknown>");
                    warn!(%window, page, id, error = %e, "record rejected");
                }
            }
        }
        report.records_rejected += rejected;
        metrics::record_records("rejected", rejected);

        let stored = match self.sink.upsert(&records).await {
            Ok(n) => n,
            Err(e) => {
                report.page_failures += 1;
                metrics::record_records("failed", records.len() as u64);
                error!(%window, page, records = records.len(), error = %e, "failed to store page");
                0
            }
        };
        report.records_stored += stored;
        metrics::record_records("stored", stored);
        self.progress.add_records(stored, rejected);
    }
}

/// `covered_until` is always before the range end while a fetch is
/// outstanding, so the remainder is non-empty.
fn halt(error: FetchError, range: TimeWindow, covered_until: i64) -> SchedulerError {
    let uncovered = TimeWindow::new(covered_until, range.end()).unwrap_or(range);
    match error {
        FetchError::Cancelled => {
            warn!(uncovered = %uncovered, "harvest cancelled");
            SchedulerError::Cancelled { uncovered }
        }
        FetchError::FatalConnection(reason) => SchedulerError::FatalConnection { uncovered, reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSearchApi, MemorySink, pool_of, raw_resume, response};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const T0: i64 = 1_704_067_200;
    const THIRTY_DAYS: i64 = 2_592_000;

    fn scheduler(
        api: Arc<FakeSearchApi>,
        sink: Arc<MemorySink>,
        settings: HarvestSettings,
        cancel: CancellationToken,
    ) -> IngestionScheduler {
        let fetcher = ResilientFetcher::new(api, pool_of(&["a", "b"]), "ua", cancel);
        IngestionScheduler::new(fetcher, sink, settings, HarvestProgress::new())
    }

    fn two_halves() -> Vec<i64> {
        let mid = T0 + THIRTY_DAYS / 2;
        let mut population: Vec<i64> = (0..1200).map(|i| T0 + i * 100).collect();
        population.extend((0..1250).map(|i| mid + i * 100));
        population
    }

    #[tokio::test(start_paused = true)]
    async fn thirty_day_window_over_cap_pages_both_leaves_in_order() {
        let api = Arc::new(FakeSearchApi::new(two_halves()));
        let sink = Arc::new(MemorySink::default());
        let mut scheduler = scheduler(
            api.clone(),
            sink.clone(),
            HarvestSettings::default(),
            CancellationToken::new(),
        );

        let report = scheduler.run(T0, T0 + THIRTY_DAYS).await.unwrap();
        assert_eq!(report.expected, 2450);
        assert_eq!(report.leaves, 2);
        assert_eq!(report.pages, 25);
        assert_eq!(report.records_stored, 2450);

        let mid = T0 + THIRTY_DAYS / 2;
        let left = TimeWindow::new(T0, mid).unwrap();
        let right = TimeWindow::new(mid, T0 + THIRTY_DAYS).unwrap();
        let mut expected_pages: Vec<(TimeWindow, u32)> = (0..12).map(|p| (left, p)).collect();
        expected_pages.extend((0..13).map(|p| (right, p)));
        assert_eq!(api.page_calls(), expected_pages);

        let batches = sink.batches();
        assert_eq!(batches.len(), 25);
        assert_eq!(batches[0][0], "r0");
        assert_eq!(batches[24].len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_page_size_drives_both_page_count_and_request() {
        let population: Vec<i64> = (0..130).map(|i| T0 + i).collect();
        let api = Arc::new(FakeSearchApi::new(population));
        let sink = Arc::new(MemorySink::default());
        let settings = HarvestSettings {
            page_size: 50,
            ..HarvestSettings::default()
        };
        let mut scheduler = scheduler(api.clone(), sink.clone(), settings, CancellationToken::new());

        let report = scheduler.run(T0, T0 + 3600).await.unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.records_stored, 130);

        let page_sizes: Vec<Option<u32>> = api
            .calls()
            .into_iter()
            .filter(|(q, ..)| !q.is_count())
            .map(|(q, ..)| q.per_page())
            .collect();
        assert_eq!(page_sizes, vec![Some(50); 3]);
        let sizes: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn every_record_is_delivered_exactly_once() {
        let range = TimeWindow::new(T0, T0 + 3 * THIRTY_DAYS + 5000).unwrap();
        let mut population = FakeSearchApi::spread(range, 6000);
        population.extend((0..4100).map(|i| T0 + 40 * 86_400 + i));
        let total = population.len();

        let api = Arc::new(FakeSearchApi::new(population));
        let sink = Arc::new(MemorySink::default());
        let mut scheduler = scheduler(
            api,
            sink.clone(),
            HarvestSettings::default(),
            CancellationToken::new(),
        );

        let report = scheduler.run(range.start(), range.end()).await.unwrap();
        assert_eq!(report.sub_windows, 4);
        assert_eq!(report.forced_leaves, 0);

        let mut ids: Vec<String> = sink.batches().into_iter().flatten().collect();
        assert_eq!(ids.len(), total);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[tokio::test]
    async fn inverted_range_is_configuration_error() {
        let api = Arc::new(FakeSearchApi::new(Vec::new()));
        let mut scheduler = scheduler(
            api.clone(),
            Arc::new(MemorySink::default()),
            HarvestSettings::default(),
            CancellationToken::new(),
        );

        for (start, end) in [(T0, T0), (T0 + 10, T0)] {
            let err = scheduler.run(start, end).await.unwrap_err();
            assert!(matches!(err, SchedulerError::Configuration(_)), "got {err:?}");
        }
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_settings_are_configuration_error() {
        let settings = HarvestSettings {
            page_size: 5000,
            ..HarvestSettings::default()
        };
        let mut scheduler = scheduler(
            Arc::new(FakeSearchApi::new(Vec::new())),
            Arc::new(MemorySink::default()),
            settings,
            CancellationToken::new(),
        );
        assert!(matches!(
            scheduler.run(T0, T0 + 60).await,
            Err(SchedulerError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_leaf_fetches_no_pages() {
        let api = Arc::new(FakeSearchApi::new(Vec::new()));
        let mut scheduler = scheduler(
            api.clone(),
            Arc::new(MemorySink::default()),
            HarvestSettings::default(),
            CancellationToken::new(),
        );

        let report = scheduler.run(T0, T0 + 3600).await.unwrap();
        assert_eq!(report.leaves, 1);
        assert_eq!(report.pages, 0);
        assert!(api.page_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_skips_page_and_continues() {
        let population: Vec<i64> = (0..300).map(|i| T0 + i).collect();
        let api = Arc::new(FakeSearchApi::new(population));
        let sink = Arc::new(MemorySink::failing_on(vec![1]));
        let mut scheduler = scheduler(
            api,
            sink.clone(),
            HarvestSettings::default(),
            CancellationToken::new(),
        );

        let report = scheduler.run(T0, T0 + 3600).await.unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.page_failures, 1);
        assert_eq!(report.records_stored, 200);
        assert_eq!(sink.batches().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_records_are_rejected_individually() {
        let api = Arc::new(FakeSearchApi::new(Vec::new()));
        // expected-count probe, leaf probe, then the single page
        api.push_override(response(200, r#"{"found":3}"#));
        api.push_override(response(200, r#"{"found":3}"#));
        let mut broken = raw_resume("bad", T0);
        broken["alternate_url"] = Value::Null;
        let page = serde_json::json!({
            "found": 3,
            "items": [raw_resume("ok1", T0), broken, raw_resume("ok2", T0 + 1)]
        });
        api.push_override(response(200, &page.to_string()));

        let sink = Arc::new(MemorySink::default());
        let mut scheduler = scheduler(
            api,
            sink.clone(),
            HarvestSettings::default(),
            CancellationToken::new(),
        );

        let report = scheduler.run(T0, T0 + 60).await.unwrap();
        assert_eq!(report.records_rejected, 1);
        assert_eq!(report.records_stored, 2);
        assert_eq!(sink.batches(), vec![vec!["ok1".to_string(), "ok2".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_reports_uncovered_remainder() {
        let range_end = T0 + 2 * THIRTY_DAYS;
        let population: Vec<i64> = vec![T0 + 10, T0 + THIRTY_DAYS + 10];
        let api = Arc::new(FakeSearchApi::new(population));
        let sink = Arc::new(MemorySink::default());
        let settings = HarvestSettings::default();
        let mut scheduler = scheduler(api.clone(), sink.clone(), settings, CancellationToken::new());

        // range probe, first sub-window probe, its page, then the second
        // sub-window probe is refused
        for _ in 0..3 {
            api.push_override(response(200, &serde_json::json!({
                "found": 1,
                "items": [raw_resume("first", T0 + 10)]
            }).to_string()));
        }
        api.push_override(response(403, r#"{"value":"ip_blocked"}"#));

        let err = scheduler.run(T0, range_end).await.unwrap_err();
        match err {
            SchedulerError::FatalConnection { uncovered, reason } => {
                assert_eq!(uncovered, TimeWindow::new(T0 + THIRTY_DAYS, range_end).unwrap());
                assert!(reason.contains("ip_blocked"));
            }
            other => panic!("expected fatal connection error, got {other:?}"),
        }
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(scheduler.progress().state(), RunState::Failed);
        assert_eq!(scheduler.progress().snapshot().covered_until, T0 + THIRTY_DAYS);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_within_the_run() {
        let population: Vec<i64> = (0..150).map(|i| T0 + i).collect();
        let api = Arc::new(FakeSearchApi::new(population));
        api.push_override(response(503, "maintenance"));
        api.push_override(response(403, r#"{"value":"token_revoked"}"#));
        let sink = Arc::new(MemorySink::default());
        let mut scheduler = scheduler(
            api.clone(),
            sink.clone(),
            HarvestSettings::default(),
            CancellationToken::new(),
        );

        let report = scheduler.run(T0, T0 + 3600).await.unwrap();
        assert_eq!(report.records_stored, 150);
        assert_eq!(scheduler.progress().snapshot().retries, 2);
        assert_eq!(scheduler.fetcher().pool().active_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_reports_uncovered_range() {
        let api = Arc::new(FakeSearchApi::new(Vec::new()));
        for _ in 0..64 {
            api.push_override(response(500, ""));
        }
        let cancel = CancellationToken::new();
        let mut scheduler = scheduler(
            api,
            Arc::new(MemorySink::default()),
            HarvestSettings::default(),
            cancel.clone(),
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            trigger.cancel();
        });

        let err = scheduler.run(T0, T0 + 3600).await.unwrap_err();
        match err {
            SchedulerError::Cancelled { uncovered } => {
                assert_eq!(uncovered, TimeWindow::new(T0, T0 + 3600).unwrap());
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(scheduler.progress().state(), RunState::Cancelled);
    }

    #[test]
    fn settings_validation() {
        assert!(HarvestSettings::default().validate().is_ok());
        for bad in [
            HarvestSettings { result_cap: 0, ..Default::default() },
            HarvestSettings { page_size: 0, ..Default::default() },
            HarvestSettings { interval_ceiling_secs: 0, ..Default::default() },
            HarvestSettings { min_granularity_secs: -1, ..Default::default() },
        ] {
            assert!(bad.validate().is_err(), "{bad:?} should be rejected");
        }
    }
}
