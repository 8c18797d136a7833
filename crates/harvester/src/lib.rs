//! Resume harvest core
//!
//! Turns a time range into a complete, deduplicated set of stored resumes
//! despite a search API that caps each query's result set:
//! 1. `partition` bisects windows until every leaf is within the cap
//! 2. `fetcher` performs each count and page request, retrying through
//!    transient failures and rotating identities on auth failures
//! 3. `record` validates raw items into `ResumeRecord`s
//! 4. `sink` upserts each page by resume id
//!
//! `scheduler` drives all four sequentially and publishes live counters
//! through `progress`.

pub mod backoff;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod partition;
pub mod progress;
pub mod record;
pub mod scheduler;
pub mod sink;

#[cfg(test)]
mod testing;

pub use backoff::BackoffState;
pub use error::{FetchError, SchedulerError, SinkError, ValidationError};
pub use fetcher::{ResilientFetcher, RetryCause, RetryEvent};
pub use partition::{CountProbe, Leaf, LeafKind, Partitioner};
pub use progress::{HarvestProgress, ProgressSnapshot, RunState};
pub use record::ResumeRecord;
pub use scheduler::{HarvestSettings, IngestionScheduler, RunReport};
pub use sink::{RecordSink, SqliteSink};
