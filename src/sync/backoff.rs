//! Retry delays for failed sync attempts.

use chrono::Duration;
use rand::Rng;

use crate::adapters::{SyncError, SyncErrorKind};
use crate::config::RetryPolicyConfig;

/// Upper bound on any single delay, well inside `DateTime` arithmetic.
const MAX_DELAY_MILLIS: i64 = 100 * 365 * 24 * 60 * 60 * 1_000;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    config: RetryPolicyConfig,
}

impl BackoffPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self { config }
    }

    /// Delay before retrying after the `attempt`-th failure (1-based).
    pub fn delay(&self, provider: &str, attempt: u32, error: &SyncError) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(provider, attempt, error, &mut rng)
    }

    /// `min(base * 2^(attempt-1), cap)`, raised to the retry-after hint and
    /// the rate-limit floor for throttling errors, plus up to
    /// `jitter_factor` of itself. The hint never exceeds the larger of the
    /// cap and the floor.
    pub fn delay_with_rng<R: Rng + ?Sized>(
        &self,
        provider: &str,
        attempt: u32,
        error: &SyncError,
        rng: &mut R,
    ) -> Duration {
        let (base, cap, jitter_factor) = self.config.effective_for(provider);

        let exponent = attempt.saturating_sub(1).min(62);
        let mut seconds = (base as f64 * 2_f64.powi(exponent as i32)).min(cap as f64);

        if let SyncErrorKind::RateLimited { retry_after_secs } = &error.kind {
            let floor = self.config.rate_limit_floor_seconds;
            let hint = retry_after_secs.unwrap_or(0).min(cap.max(floor));
            seconds = seconds.max(hint as f64).max(floor as f64);
        }

        if jitter_factor > 0.0 {
            seconds += rng.gen_range(0.0..=jitter_factor * seconds);
        }

        let millis = (seconds * 1_000.0).round().min(MAX_DELAY_MILLIS as f64) as i64;
        Duration::milliseconds(millis)
    }
}
