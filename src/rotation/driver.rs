//! Timer loop advancing every due rotation.

use std::sync::Arc;

use chrono::Utc;
use metrics::histogram;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::RotationScheduler;
use crate::db::StoreHealth;

pub struct RotationDriver {
    scheduler: Arc<RotationScheduler>,
    health: StoreHealth,
    tick: Duration,
}

impl RotationDriver {
    pub fn new(scheduler: Arc<RotationScheduler>, health: StoreHealth, tick: Duration) -> Self {
        Self {
            scheduler,
            health,
            tick,
        }
    }

    /// Run until `shutdown` fires. Store failures are logged and the next
    /// tick tries again.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(tick_ms = self.tick.as_millis() as u64, "Starting rotation driver");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Rotation driver shutdown requested");
                    break;
                }
                _ = sleep(self.tick) => {
                    let started = Instant::now();
                    match self.scheduler.poll_due(Utc::now()).await {
                        Ok(advanced) => {
                            self.health.mark_healthy();
                            if advanced > 0 {
                                debug!(advanced, "rotation driver tick");
                            }
                        }
                        Err(err) => {
                            if err.is_unavailable() {
                                self.health.mark_unhealthy();
                            }
                            error!(error = %err, "Rotation driver tick failed");
                        }
                    }
                    histogram!("rotation_driver_tick_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Rotation driver stopped");
    }
}
