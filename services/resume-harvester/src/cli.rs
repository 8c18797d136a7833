//! Command-line arguments

use std::path::PathBuf;

use chrono::DateTime;
use clap::Parser;
use search_api::TimeWindow;

/// Harvest every resume published in a time range into SQLite.
#[derive(Debug, Parser)]
#[command(name = "resume-harvester", version)]
pub struct Cli {
    /// Config file (defaults to CONFIG_PATH, then ./resume-harvester.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Range start, inclusive: RFC 3339 or unix seconds
    #[arg(long, value_parser = parse_timestamp)]
    pub from: i64,

    /// Range end, exclusive: RFC 3339 or unix seconds
    #[arg(long, value_parser = parse_timestamp)]
    pub to: i64,
}

impl Cli {
    /// The half-open range `[from, to)`; `from` must precede `to`.
    pub fn range(&self) -> search_api::Result<TimeWindow> {
        TimeWindow::new(self.from, self.to)
    }
}

/// Accepts unix seconds or an RFC 3339 timestamp.
pub fn parse_timestamp(raw: &str) -> Result<i64, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp())
        .map_err(|e| format!("expected RFC 3339 or unix seconds, got {raw:?}: {e}"))
}
