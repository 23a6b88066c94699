//! # Sync Worker
//!
//! Loop that drains the queue: claim a job, run its adapter under the job
//! timeout, report the result. Jobs abandoned by a crashed worker are reaped
//! periodically through the same failure path.

use std::sync::Arc;

use chrono::Utc;
use metrics::histogram;
use tokio::time::{Duration, Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::queue::{ReportOutcome, SyncQueueManager};
use crate::adapters::{AdapterRegistry, SyncContext, SyncError};
use crate::config::WorkerConfig;
use crate::db::StoreHealth;
use crate::error::EngineResult;
use crate::models::sync_job;

pub struct SyncWorker {
    queue: Arc<SyncQueueManager>,
    registry: Arc<AdapterRegistry>,
    health: StoreHealth,
    config: WorkerConfig,
}

impl SyncWorker {
    pub fn new(
        queue: Arc<SyncQueueManager>,
        registry: Arc<AdapterRegistry>,
        health: StoreHealth,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            health,
            config,
        }
    }

    /// Run until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(tick_ms = self.config.tick_ms, "Starting sync worker");
        let tick = Duration::from_millis(self.config.tick_ms);
        let reap_every = Duration::from_secs(self.config.reap_interval_seconds);
        let mut last_reap = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync worker shutdown requested");
                    break;
                }
                _ = sleep(tick) => {
                    if last_reap.elapsed() >= reap_every {
                        last_reap = Instant::now();
                        match self.queue.reap_timed_out(Utc::now()).await {
                            Ok(0) => {}
                            Ok(reaped) => warn!(reaped, "Reaped timed out sync jobs"),
                            Err(err) => error!(error = %err, "Failed to reap timed out jobs"),
                        }
                    }

                    let mut processed = 0usize;
                    while !shutdown.is_cancelled() {
                        match self.process_next().await {
                            Ok(Some(_)) => {
                                processed += 1;
                                self.health.mark_healthy();
                            }
                            Ok(None) => {
                                self.health.mark_healthy();
                                break;
                            }
                            Err(err) => {
                                if err.is_unavailable() {
                                    self.health.mark_unhealthy();
                                }
                                error!(error = %err, "Sync worker iteration failed");
                                break;
                            }
                        }
                    }
                    if processed > 0 {
                        debug!(processed, "Sync worker drained queue");
                    }
                }
            }
        }

        info!("Sync worker stopped");
    }

    /// Claims and runs one job. `None` when nothing is runnable.
    pub async fn process_next(&self) -> EngineResult<Option<ReportOutcome>> {
        let Some(job) = self.queue.dequeue_next(Utc::now()).await? else {
            return Ok(None);
        };
        self.execute(job).await.map(Some)
    }

    #[instrument(
        skip(self, job),
        fields(job_id = %job.id, provider = %job.provider, sync_type = %job.sync_type)
    )]
    async fn execute(&self, job: sync_job::Model) -> EngineResult<ReportOutcome> {
        let ctx = SyncContext {
            job_id: job.id,
            user_id: job.user_id,
            provider: job.provider.clone(),
            sync_type: job.sync_type.clone(),
            attempt: u32::try_from(job.attempt_count).unwrap_or(0) + 1,
        };
        let limit = self
            .queue
            .job_timeout()
            .to_std()
            .unwrap_or(Duration::from_secs(self.queue.config().job_timeout_seconds));

        let started = Instant::now();
        let result = match self.registry.get(&job.provider) {
            Ok(adapter) => match timeout(limit, adapter.sync(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::timeout(format!(
                    "adapter did not finish within {}s",
                    limit.as_secs()
                ))),
            },
            Err(err) => Err(SyncError::permanent(err.to_string())),
        };
        histogram!("sync_worker_job_duration_ms", "provider" => job.provider.clone())
            .record(started.elapsed().as_secs_f64() * 1_000.0);

        if let Err(err) = &result {
            debug!(attempt = ctx.attempt, error = %err, "adapter reported failure");
        }

        self.queue.report_result(job.id, result, Utc::now()).await
    }
}
