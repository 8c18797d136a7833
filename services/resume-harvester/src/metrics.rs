//! Prometheus metrics exposition
//!
//! The harvest counters are emitted by the `harvester` and `identity-pool`
//! crates. This binary installs the recorder and adds run-level series:
//!
//! - `harvest_runs_total` (counter): label `outcome`
//! - `harvest_run_duration_seconds` (histogram): label `outcome`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const RUN_DURATION_BUCKETS: &[f64] = &[
    1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0, 43200.0, 86400.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("harvest_run_duration_seconds".to_string()),
            RUN_DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished run.
pub fn record_run(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("harvest_runs_total", "outcome" => outcome).increment(1);
    metrics::histogram!("harvest_run_duration_seconds", "outcome" => outcome).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_run_does_not_panic_without_recorder() {
        record_run("completed", 1.0);
    }

    #[test]
    fn record_run_renders_counter_and_histogram() {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_run("completed", 42.0);
        record_run("failed", 3.0);

        let output = handle.render();
        assert!(output.contains("harvest_runs_total{outcome=\"completed\"} 1"));
        assert!(output.contains("harvest_runs_total{outcome=\"failed\"} 1"));
        assert!(output.contains("harvest_run_duration_seconds_bucket"));
    }
}
