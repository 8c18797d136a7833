//! Resume Harvester
//!
//! Single-binary batch job that:
//! 1. Loads the identity pool and authorizes every identity without a token
//! 2. Harvests every resume published in `[--from, --to)` from the search API
//! 3. Upserts each validated page into SQLite
//! 4. Optionally serves run progress and metrics while the run is in flight

mod cli;
mod config;
mod metrics;
mod status;

use anyhow::{Context, Result};
use clap::Parser;
use harvest_auth::{ConsoleResolver, HttpTokenExchange, TokenCache, load_credential_list};
use harvester::{
    HarvestProgress, IngestionScheduler, ResilientFetcher, SchedulerError, SqliteSink,
};
use identity_pool::{IdentityPool, TokenLifecycle};
use search_api::{HttpSearchTransport, TimeWindow};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::Config;
use crate::status::StatusState;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON output, LOG_LEVEL then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();
    // before any I/O: bootstrap may block on a human
    let range = cli.range().context("invalid harvest range")?;

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        search_url = %config.api.search_url,
        credentials = %config.identities.credentials_path.display(),
        database = %config.sink.database_path.display(),
        rotation = ?config.identities.rotation,
        result_cap = config.harvest.result_cap,
        page_size = config.harvest.page_size,
        "configuration loaded"
    );

    // Install before anything emits
    let prometheus = metrics::install_recorder();

    let run_id = format!("run_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("harvest", run_id = %run_id, window = %range);
    run(range, config, prometheus).instrument(span).await
}

async fn run(
    range: TimeWindow,
    config: Config,
    prometheus: metrics_exporter_prometheus::PrometheusHandle,
) -> Result<()> {
    let started_at = Instant::now();
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    let client = reqwest::Client::new();

    let entries = load_credential_list(&config.identities.credentials_path)
        .await
        .with_context(|| {
            format!(
                "failed to load credentials from {}",
                config.identities.credentials_path.display()
            )
        })?;

    let client_secret = config
        .oauth
        .client_secret
        .clone()
        .context("oauth client secret missing")?;
    let exchange = HttpTokenExchange::new(
        client.clone(),
        &config.api.token_url,
        &config.oauth.client_id,
        client_secret,
    );
    let lifecycle = TokenLifecycle::new(
        Arc::new(exchange),
        Arc::new(ConsoleResolver::stdio()),
        &config.api.authorize_url,
        &config.oauth.client_id,
    );

    let mut pool = IdentityPool::new(entries, lifecycle, config.identities.rotation)
        .context("failed to build identity pool")?;
    if let Some(cache_path) = &config.identities.token_cache_path {
        let cache = TokenCache::load(cache_path.clone())
            .await
            .with_context(|| format!("failed to load token cache {}", cache_path.display()))?;
        pool = pool.with_cache(cache);
    }

    pool.bootstrap(&cancel)
        .await
        .context("identity bootstrap failed")?;

    let sink = SqliteSink::connect(&config.sink.database_path)
        .await
        .with_context(|| {
            format!(
                "failed to open database {}",
                config.sink.database_path.display()
            )
        })?;
    let sink = Arc::new(sink);

    let transport = HttpSearchTransport::new(
        client,
        &config.api.search_url,
        config.api.timestamp_zone,
        Duration::from_secs(config.api.timeout_secs),
    );
    let fetcher = ResilientFetcher::new(
        Arc::new(transport),
        pool,
        &config.api.user_agent,
        cancel.clone(),
    );

    let progress = HarvestProgress::new();

    let server_stop = CancellationToken::new();
    let server = match config.status.listen_addr {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind status server to {addr}"))?;
            info!(addr = %addr, "status server listening");
            let app = status::build_router(StatusState {
                progress: progress.clone(),
                prometheus,
                started_at,
            });
            let stop = server_stop.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(stop.cancelled_owned())
                    .await
            }))
        }
        None => None,
    };

    let mut scheduler =
        IngestionScheduler::new(fetcher, sink.clone(), config.harvest.clone(), progress);
    let outcome = scheduler.run(range.start(), range.end()).await;

    let elapsed = started_at.elapsed().as_secs_f64();
    let result = match outcome {
        Ok(report) => {
            metrics::record_run("completed", elapsed);
            match sink.count().await {
                Ok(rows) => info!(rows, "database row count"),
                Err(e) => warn!(error = %e, "failed to count stored rows"),
            }
            info!(
                elapsed_secs = elapsed,
                stored = report.records_stored,
                page_failures = report.page_failures,
                "run finished"
            );
            Ok(())
        }
        Err(e @ SchedulerError::Cancelled { .. }) => {
            metrics::record_run("cancelled", elapsed);
            warn!(error = %e, "run cancelled");
            Err(e.into())
        }
        Err(e) => {
            metrics::record_run("failed", elapsed);
            error!(error = %e, "run failed");
            Err(e.into())
        }
    };

    server_stop.cancel();
    if let Some(handle) = server {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "status server error"),
            Err(e) => error!(error = %e, "status server task panicked"),
        }
    }

    result
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, cancelling harvest"),
        _ = terminate => info!("received SIGTERM, cancelling harvest"),
    }
}
