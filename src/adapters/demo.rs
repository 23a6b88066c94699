//! Demo adapter for local runs.
//!
//! Pretends to sync a random number of records after a short delay, failing
//! transiently at a configurable rate.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use uuid::Uuid;

use super::{ProviderAdapter, SyncContext, SyncError, SyncOutcome};
use crate::models::provider::ProviderStatus;

#[derive(Debug, Clone)]
pub struct DemoAdapter {
    latency: Duration,
    failure_rate: f64,
}

impl DemoAdapter {
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for DemoAdapter {
    fn default() -> Self {
        Self::new(Duration::from_millis(0), 0.0)
    }
}

#[async_trait]
impl ProviderAdapter for DemoAdapter {
    async fn sync(&self, ctx: &SyncContext) -> Result<SyncOutcome, SyncError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let (failed, records) = {
            let mut rng = rand::thread_rng();
            (
                self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate),
                rng.gen_range(1..=500u64),
            )
        };

        if failed {
            return Err(SyncError::transient("simulated upstream hiccup")
                .with_details(json!({"provider": ctx.provider, "attempt": ctx.attempt})));
        }

        Ok(SyncOutcome {
            records_synced: records,
            details: Some(json!({"sync_type": ctx.sync_type})),
        })
    }

    async fn test_connection(&self, _user_id: Uuid, _provider: &str) -> Result<(), SyncError> {
        Ok(())
    }

    async fn get_status(
        &self,
        _user_id: Uuid,
        _provider: &str,
    ) -> Result<ProviderStatus, SyncError> {
        Ok(ProviderStatus::Active)
    }
}
