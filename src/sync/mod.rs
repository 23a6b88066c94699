//! # Provider Sync
//!
//! - [`SyncQueueManager`]: enqueue, claim and settle per-provider sync jobs
//! - [`SyncWorker`]: drains the queue through the registered adapters
//! - [`BackgroundRefresh`]: turns due refresh schedules into incremental jobs
//! - [`BackoffPolicy`]: retry delays

pub mod backoff;
pub mod queue;
pub mod refresh;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use queue::{
    EnqueueRequest, EnqueueResult, ProviderQueueSummary, ReportOutcome, SYNC_TYPE_FULL,
    SYNC_TYPE_INCREMENTAL, SyncJobView, SyncQueueManager,
};
pub use refresh::{BackgroundRefresh, RefreshTickStats};
pub use worker::SyncWorker;
