//! # Background Refresh
//!
//! Periodic driver over `rotation_schedule`. Each due row is claimed, pushed
//! one jittered interval into the future and turned into an incremental sync
//! job. The queue writes the job's outcome back onto the row.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use rand::Rng;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::queue::{EnqueueRequest, SYNC_TYPE_INCREMENTAL, SyncQueueManager};
use crate::config::WorkerConfig;
use crate::db::StoreHealth;
use crate::error::EngineResult;
use crate::repositories::ScheduleRepository;

/// Schedule rows evaluated per tick.
const DEFAULT_BATCH_SIZE: u64 = 128;

pub struct BackgroundRefresh {
    queue: Arc<SyncQueueManager>,
    schedules: ScheduleRepository,
    health: StoreHealth,
    config: WorkerConfig,
    batch_size: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTickStats {
    pub due: u64,
    pub claimed: u64,
    pub enqueued: u64,
    pub errors: u64,
}

impl BackgroundRefresh {
    pub fn new(
        queue: Arc<SyncQueueManager>,
        schedules: ScheduleRepository,
        health: StoreHealth,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            schedules,
            health,
            config,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the number of rows processed per tick.
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting background refresh");
        let tick = TokioDuration::from_secs(self.config.refresh_tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Background refresh shutdown requested");
                    break;
                }
                _ = sleep(tick) => {
                    let started = Instant::now();
                    match self.tick(Utc::now()).await {
                        Ok(stats) => {
                            self.health.mark_healthy();
                            debug!(
                                due = stats.due,
                                claimed = stats.claimed,
                                enqueued = stats.enqueued,
                                errors = stats.errors,
                                "Background refresh tick completed"
                            );
                        }
                        Err(err) => {
                            if err.is_unavailable() {
                                self.health.mark_unhealthy();
                            }
                            error!(error = %err, "Background refresh tick failed");
                        }
                    }
                    histogram!("background_refresh_tick_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Background refresh stopped");
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> EngineResult<RefreshTickStats> {
        let mut stats = RefreshTickStats::default();
        let due = self.schedules.find_due(now, self.batch_size).await?;
        stats.due = due.len() as u64;

        for row in due {
            let jitter =
                sample_jitter_seconds(self.config.refresh_jitter_pct_max, row.interval_seconds);
            let next_at = now + Duration::seconds(row.interval_seconds.max(1) + jitter);

            match self.schedules.claim(&row, now, next_at).await {
                Ok(true) => stats.claimed += 1,
                Ok(false) => {
                    debug!(
                        user_id = %row.user_id,
                        provider = %row.provider,
                        "schedule claimed elsewhere"
                    );
                    continue;
                }
                Err(err) => {
                    stats.errors += 1;
                    warn!(
                        user_id = %row.user_id,
                        provider = %row.provider,
                        error = %err,
                        "failed to claim schedule"
                    );
                    continue;
                }
            }

            let request = EnqueueRequest {
                user_id: row.user_id,
                provider: row.provider.clone(),
                sync_type: SYNC_TYPE_INCREMENTAL.to_string(),
                priority: None,
                scheduled_for: None,
            };
            match self.queue.enqueue(request, now).await {
                Ok(result) => {
                    if result.created {
                        stats.enqueued += 1;
                        counter!(
                            "background_refresh_enqueued_total",
                            "provider" => row.provider.clone()
                        )
                        .increment(1);
                    }
                    info!(
                        user_id = %row.user_id,
                        provider = %row.provider,
                        job_id = %result.job_id,
                        jitter_seconds = jitter,
                        next_at = %next_at,
                        "Background refresh scheduled"
                    );
                }
                Err(err) => {
                    stats.errors += 1;
                    error!(
                        user_id = %row.user_id,
                        provider = %row.provider,
                        error = %err,
                        "failed to enqueue background refresh"
                    );
                }
            }
        }

        Ok(stats)
    }
}

fn sample_jitter_seconds(pct_max: f64, interval_seconds: i64) -> i64 {
    let mut rng = rand::thread_rng();
    compute_jitter_seconds(pct_max, interval_seconds, &mut rng)
}

fn compute_jitter_seconds<R: Rng + ?Sized>(
    pct_max: f64,
    interval_seconds: i64,
    rng: &mut R,
) -> i64 {
    let max = pct_max.max(0.0);
    if max == 0.0 || interval_seconds <= 0 {
        return 0;
    }
    let pct = rng.gen_range(0.0..=max);
    (interval_seconds as f64 * pct).round() as i64
}
