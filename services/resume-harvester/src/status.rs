//! Status server
//!
//! `GET /health` returns the live run progress as JSON; `GET /metrics` renders
//! the Prometheus exposition. Answers 503 once a run has failed.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use harvester::{HarvestProgress, RunState};
use metrics_exporter_prometheus::PrometheusHandle;
use std::time::Instant;

/// Shared state for the status handlers
#[derive(Clone)]
pub struct StatusState {
    pub progress: HarvestProgress,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

pub fn build_router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<StatusState>) -> impl IntoResponse {
    let snapshot = state.progress.snapshot();
    let status_code = match snapshot.state {
        RunState::Failed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let body = serde_json::json!({
        "status": if status_code == StatusCode::OK { "healthy" } else { "failed" },
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "progress": snapshot,
    });

    (
        status_code,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

async fn metrics_handler(State(state): State<StatusState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn test_state(progress: HarvestProgress) -> StatusState {
        StatusState {
            progress,
            prometheus: PrometheusBuilder::new().build_recorder().handle(),
            started_at: Instant::now(),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_idle_progress() {
        let app = build_router(test_state(HarvestProgress::new()));

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["progress"]["state"], "idle");
        assert_eq!(json["progress"]["records_stored"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = StatusState {
            progress: HarvestProgress::new(),
            prometheus: recorder.handle(),
            started_at: Instant::now(),
        };
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("harvest_pages_total").increment(3);
        });

        let response = build_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("harvest_pages_total 3"), "got: {text}");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = build_router(test_state(HarvestProgress::new()))
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
