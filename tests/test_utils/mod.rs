//! Test utilities for database testing.
//!
//! In-memory SQLite databases with migrations applied, plus scripted stand-ins
//! for the provider adapter and metric source collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use rotation_sync::adapters::{ProviderAdapter, SyncContext, SyncError, SyncOutcome};
use rotation_sync::analytics::{
    AnalyticsCacheManager, MetricSample, MetricSource, MetricSourceError,
};
use rotation_sync::config::AppConfig;
use rotation_sync::models::provider::ProviderStatus;
use rotation_sync::sync::SyncQueueManager;
use sea_orm::{Database, DatabaseConnection};
use tokio::sync::Notify;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Sets up an in-memory SQLite database with all migrations applied and returns an Arc.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Fixed reference instant so tests never depend on the wall clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().expect("valid instant")
}

/// Defaults with deterministic retries: base 1s, cap 60s, no jitter, 3 attempts.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry_policy.base_seconds = 1;
    config.retry_policy.max_seconds = 60;
    config.retry_policy.jitter_factor = 0.0;
    config.retry_policy.rate_limit_floor_seconds = 10;
    config.sync.max_attempts = 3;
    config.sync.job_timeout_seconds = 300;
    config.worker.refresh_jitter_pct_max = 0.0;
    config
}

/// Queue manager wired to a fresh analytics cache over `source`.
pub fn queue_with_source(
    db: Arc<DatabaseConnection>,
    config: &AppConfig,
    source: Arc<dyn MetricSource>,
) -> (Arc<SyncQueueManager>, Arc<AnalyticsCacheManager>) {
    let analytics = Arc::new(AnalyticsCacheManager::new(
        db.clone(),
        source,
        config.analytics.clone(),
    ));
    let queue = Arc::new(SyncQueueManager::new(db, config, analytics.clone()));
    (queue, analytics)
}

/// Metric source returning the same samples every call and counting calls.
#[derive(Default)]
pub struct CountingSource {
    samples: Mutex<Vec<MetricSample>>,
    calls: AtomicUsize,
    failing: Mutex<Vec<String>>,
}

impl CountingSource {
    pub fn with_samples(samples: Vec<MetricSample>) -> Self {
        Self {
            samples: Mutex::new(samples),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_samples(&self, samples: Vec<MetricSample>) {
        *self.samples.lock().expect("samples lock") = samples;
    }

    /// Makes every load for `provider` fail.
    pub fn fail_for(&self, provider: &str) {
        self.failing
            .lock()
            .expect("failing lock")
            .push(provider.to_string());
    }
}

#[async_trait]
impl MetricSource for CountingSource {
    async fn load_samples(
        &self,
        _user_id: Uuid,
        provider: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, MetricSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing
            .lock()
            .expect("failing lock")
            .iter()
            .any(|p| p == provider)
        {
            return Err(MetricSourceError(format!("{provider} unavailable")));
        }
        Ok(self
            .samples
            .lock()
            .expect("samples lock")
            .iter()
            .filter(|s| s.recorded_at >= from && s.recorded_at < to)
            .copied()
            .collect())
    }
}

/// Counting source whose next load, once armed, parks until released.
#[derive(Default)]
pub struct GatedSource {
    pub inner: CountingSource,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedSource {
    pub fn with_samples(samples: Vec<MetricSample>) -> Self {
        Self {
            inner: CountingSource::with_samples(samples),
            ..Self::default()
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once the armed load has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl MetricSource for GatedSource {
    async fn load_samples(
        &self,
        user_id: Uuid,
        provider: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, MetricSourceError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.load_samples(user_id, provider, from, to).await
    }
}

/// Adapter replaying a queue of results, then succeeding.
#[derive(Default)]
pub struct ScriptedAdapter {
    script: Mutex<VecDeque<Result<SyncOutcome, SyncError>>>,
    delay: Option<std::time::Duration>,
    seen: Mutex<Vec<SyncContext>>,
}

impl ScriptedAdapter {
    pub fn new(script: Vec<Result<SyncOutcome, SyncError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn slow(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn seen(&self) -> Vec<SyncContext> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn sync(&self, ctx: &SyncContext) -> Result<SyncOutcome, SyncError> {
        self.seen.lock().expect("seen lock").push(ctx.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(SyncOutcome::with_records(1)))
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
