//! # Sync Queue
//!
//! Per-provider job queue. Every transition is an `UPDATE ... WHERE status = ?`
//! so concurrent workers and API calls never overwrite each other; the two
//! partial unique indexes on `sync_queue` back the dedup and single-flight
//! rules when those races reach the database.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use crate::adapters::{SyncError, SyncErrorKind, SyncOutcome};
use crate::analytics::AnalyticsCacheManager;
use crate::config::AppConfig;
use crate::config::SyncQueueConfig;
use crate::db::to_db_time;
use crate::error::{EngineError, EngineResult, is_unique_violation};
use crate::models::connection_event::EventType;
use crate::models::provider::ProviderStatus;
use crate::models::sync_alert::{KIND_AUTH_EXPIRED, KIND_SYNC_FAILED};
use crate::models::sync_job::{self, Column, Entity as SyncJob, JobStatus};
use crate::repositories::{
    AlertRepository, EventLog, NewEvent, ProviderRepository, ScheduleRepository,
};

/// Pending jobs examined per dequeue attempt.
const CLAIM_CANDIDATES: u64 = 32;

/// Sync type enqueued when a provider (re)connects.
pub const SYNC_TYPE_FULL: &str = "full";
/// Sync type enqueued by the periodic background refresh.
pub const SYNC_TYPE_INCREMENTAL: &str = "incremental";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EnqueueRequest {
    #[serde(skip)]
    pub user_id: Uuid,
    pub provider: String,
    #[serde(default = "default_sync_type")]
    pub sync_type: String,
    /// Higher runs sooner; the configured default when absent
    #[serde(default)]
    pub priority: Option<i32>,
    /// Earliest start; immediately when absent
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Seconds as a value `chrono::Duration::seconds` accepts.
pub(crate) fn clamp_seconds(seconds: u64) -> i64 {
    i64::try_from(seconds).unwrap_or(i64::MAX).min(i64::MAX / 1_000)
}

fn default_sync_type() -> String {
    SYNC_TYPE_FULL.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct EnqueueResult {
    pub job_id: Uuid,
    /// False when an open job for the same provider and type already existed
    pub created: bool,
}

/// What `report_result` did with the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Completed,
    Retrying { next_at: DateTime<Utc> },
    Failed,
    /// The job was no longer `processing` (cancelled, reaped or already reported)
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProviderQueueSummary {
    pub provider: String,
    pub pending: u64,
    pub processing: u64,
    /// Terminal failures since the provider's last successful sync
    pub failed: u64,
}

/// API view of a queue row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncJobView {
    pub id: Uuid,
    pub provider: String,
    pub sync_type: String,
    pub priority: i32,
    pub status: String,
    pub attempt_count: i32,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<sync_job::Model> for SyncJobView {
    fn from(job: sync_job::Model) -> Self {
        Self {
            id: job.id,
            provider: job.provider,
            sync_type: job.sync_type,
            priority: job.priority,
            status: job.status,
            attempt_count: job.attempt_count,
            scheduled_for: job.scheduled_for.with_timezone(&Utc),
            started_at: job.started_at.map(|dt| dt.with_timezone(&Utc)),
            completed_at: job.completed_at.map(|dt| dt.with_timezone(&Utc)),
            error_message: job.error_message,
            error_kind: job.error_kind,
            created_at: job.created_at.with_timezone(&Utc),
        }
    }
}

pub struct SyncQueueManager {
    db: Arc<DatabaseConnection>,
    config: SyncQueueConfig,
    backoff: BackoffPolicy,
    refresh_interval_seconds: i64,
    providers: ProviderRepository,
    events: EventLog,
    alerts: AlertRepository,
    schedules: ScheduleRepository,
    analytics: Arc<AnalyticsCacheManager>,
}

impl SyncQueueManager {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        analytics: Arc<AnalyticsCacheManager>,
    ) -> Self {
        Self {
            config: config.sync.clone(),
            backoff: BackoffPolicy::new(config.retry_policy.clone()),
            refresh_interval_seconds: clamp_seconds(config.worker.refresh_interval_seconds),
            providers: ProviderRepository::new(db.clone()),
            events: EventLog::new(db.clone()),
            alerts: AlertRepository::new(db.clone()),
            schedules: ScheduleRepository::new(db.clone()),
            analytics,
            db,
        }
    }

    pub fn config(&self) -> &SyncQueueConfig {
        &self.config
    }

    /// Adds a pending job unless one is already pending or processing for the
    /// same provider and sync type, in which case that job's id is returned.
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            provider = %request.provider,
            sync_type = %request.sync_type
        )
    )]
    pub async fn enqueue(
        &self,
        request: EnqueueRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<EnqueueResult> {
        if request.provider.trim().is_empty() {
            return Err(EngineError::validation("provider must not be empty"));
        }
        if request.sync_type.trim().is_empty() {
            return Err(EngineError::validation("sync_type must not be empty"));
        }

        if let Some(existing) = self
            .find_open(request.user_id, &request.provider, &request.sync_type)
            .await?
        {
            debug!(job_id = %existing.id, "open job already queued");
            return Ok(EnqueueResult {
                job_id: existing.id,
                created: false,
            });
        }

        self.insert_open(&request, now).await
    }

    /// Inserts the pending row. A concurrent enqueue that got there first
    /// trips `idx_sync_queue_open_per_type`; its job is returned instead.
    async fn insert_open(
        &self,
        request: &EnqueueRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<EnqueueResult> {
        let ts = to_db_time(now);
        let am = sync_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(request.user_id),
            provider: Set(request.provider.clone()),
            priority: Set(request.priority.unwrap_or(self.config.default_priority)),
            status: Set(JobStatus::Pending.as_str().to_string()),
            sync_type: Set(request.sync_type.clone()),
            scheduled_for: Set(to_db_time(request.scheduled_for.unwrap_or(now))),
            started_at: Set(None),
            completed_at: Set(None),
            error_message: Set(None),
            error_kind: Set(None),
            attempt_count: Set(0),
            created_at: Set(ts),
            updated_at: Set(ts),
        };

        match am.insert(&*self.db).await {
            Ok(job) => {
                counter!("sync_queue_enqueued_total", "provider" => job.provider.clone())
                    .increment(1);
                info!(job_id = %job.id, "sync job enqueued");
                Ok(EnqueueResult {
                    job_id: job.id,
                    created: true,
                })
            }
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .find_open(request.user_id, &request.provider, &request.sync_type)
                    .await?
                    .ok_or_else(|| EngineError::Persistence(err))?;
                debug!(job_id = %existing.id, "lost enqueue race to concurrent insert");
                Ok(EnqueueResult {
                    job_id: existing.id,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Claims the next runnable job: pending, due, and for a provider with
    /// nothing in flight. Highest priority first, then earliest
    /// `scheduled_for`, then FIFO.
    pub async fn dequeue_next(&self, now: DateTime<Utc>) -> EngineResult<Option<sync_job::Model>> {
        let candidates = self.runnable_candidates(now).await?;
        self.claim_first(candidates, now).await
    }

    async fn runnable_candidates(&self, now: DateTime<Utc>) -> EngineResult<Vec<sync_job::Model>> {
        Ok(SyncJob::find()
            .filter(Column::Status.eq(JobStatus::Pending.as_str()))
            .filter(Column::ScheduledFor.lte(to_db_time(now)))
            .filter(Expr::cust(
                "NOT EXISTS (SELECT 1 FROM sync_queue AS inflight \
                 WHERE inflight.user_id = sync_queue.user_id \
                 AND inflight.provider = sync_queue.provider \
                 AND inflight.status = 'processing')",
            ))
            .order_by_desc(Column::Priority)
            .order_by_asc(Column::ScheduledFor)
            .order_by_asc(Column::CreatedAt)
            .limit(CLAIM_CANDIDATES)
            .all(&*self.db)
            .await?)
    }

    /// Claims the first candidate still pending. Candidates may be stale by
    /// now: a provider whose claim trips `idx_sync_queue_single_flight` is
    /// skipped for the rest of the pass.
    async fn claim_first(
        &self,
        candidates: Vec<sync_job::Model>,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<sync_job::Model>> {
        let mut contended: Vec<(Uuid, String)> = Vec::new();
        for candidate in candidates {
            let key = (candidate.user_id, candidate.provider.clone());
            if contended.contains(&key) {
                continue;
            }

            let claimed = SyncJob::update_many()
                .col_expr(Column::Status, Expr::value(JobStatus::Processing.as_str()))
                .col_expr(Column::StartedAt, Expr::value(Some(to_db_time(now))))
                .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
                .filter(Column::Id.eq(candidate.id))
                .filter(Column::Status.eq(JobStatus::Pending.as_str()))
                .exec(&*self.db)
                .await;

            match claimed {
                Ok(result) if result.rows_affected == 1 => {
                    counter!("sync_queue_dequeued_total", "provider" => candidate.provider.clone())
                        .increment(1);
                    debug!(
                        job_id = %candidate.id,
                        provider = %candidate.provider,
                        "sync job claimed"
                    );
                    return Ok(SyncJob::find_by_id(candidate.id).one(&*self.db).await?);
                }
                Ok(_) => continue,
                Err(err) if is_unique_violation(&err) => {
                    debug!(provider = %candidate.provider, "provider already has a job in flight");
                    contended.push(key);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(None)
    }

    /// Applies the result of running a `processing` job.
    #[instrument(skip(self, result), fields(job_id = %job_id))]
    pub async fn report_result(
        &self,
        job_id: Uuid,
        result: Result<SyncOutcome, SyncError>,
        now: DateTime<Utc>,
    ) -> EngineResult<ReportOutcome> {
        let job = self
            .job(job_id)
            .await?
            .ok_or_else(|| EngineError::not_found("sync_job", job_id))?;

        if job.job_status() != Some(JobStatus::Processing) {
            debug!(status = %job.status, "ignoring result for job that is no longer processing");
            return Ok(ReportOutcome::Ignored);
        }

        match result {
            Ok(outcome) => self.complete(job, outcome, now).await,
            Err(error) => self.fail(job, error, now).await,
        }
    }

    /// Fails every job that has been `processing` longer than the job timeout.
    pub async fn reap_timed_out(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let timeout = self.job_timeout();
        let stale = SyncJob::find()
            .filter(Column::Status.eq(JobStatus::Processing.as_str()))
            .filter(Column::StartedAt.lte(to_db_time(now - timeout)))
            .all(&*self.db)
            .await?;

        let mut reaped = 0;
        for job in stale {
            let error = SyncError::timeout(format!(
                "job exceeded {}s timeout",
                self.config.job_timeout_seconds
            ));
            match self.report_result(job.id, Err(error), now).await? {
                ReportOutcome::Ignored => {}
                _ => {
                    warn!(job_id = %job.id, provider = %job.provider, "timed out sync job reaped");
                    reaped += 1;
                }
            }
        }
        Ok(reaped)
    }

    /// Provider (re)connected: mark it active, record the event, start its
    /// background refresh schedule and queue a full sync.
    #[instrument(skip(self, metadata), fields(user_id = %user_id, provider = %provider))]
    pub async fn handle_connect(
        &self,
        user_id: Uuid,
        provider: &str,
        display_name: &str,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> EngineResult<EnqueueResult> {
        self.providers
            .upsert_active(user_id, provider, display_name, metadata, now)
            .await?;
        self.events
            .append(
                NewEvent {
                    user_id,
                    provider: provider.to_string(),
                    event_type: EventType::Connected,
                    event_data: json!({ "display_name": display_name }),
                },
                now,
            )
            .await?;
        self.schedules
            .ensure(user_id, provider, self.refresh_interval_seconds, now)
            .await?;

        self.enqueue(
            EnqueueRequest {
                user_id,
                provider: provider.to_string(),
                sync_type: SYNC_TYPE_FULL.to_string(),
                priority: None,
                scheduled_for: None,
            },
            now,
        )
        .await
    }

    /// Provider disconnected: soft-disconnect it, record the event and cancel
    /// its open jobs. Returns how many jobs were cancelled.
    #[instrument(skip(self), fields(user_id = %user_id, provider = %provider))]
    pub async fn handle_disconnect(
        &self,
        user_id: Uuid,
        provider: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<u64> {
        self.providers
            .set_status(user_id, provider, ProviderStatus::Disconnected, now)
            .await?;
        self.events
            .append(
                NewEvent {
                    user_id,
                    provider: provider.to_string(),
                    event_type: EventType::Disconnected,
                    event_data: json!({}),
                },
                now,
            )
            .await?;
        self.schedules.pause(user_id, provider).await?;

        let open = SyncJob::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::Status.is_in([
                JobStatus::Pending.as_str(),
                JobStatus::Processing.as_str(),
            ]))
            .all(&*self.db)
            .await?;

        let mut cancelled = 0;
        for job in open {
            let attempts = job.attempt_count;
            let error = SyncError::cancelled("provider disconnected");
            if self.terminate(job, &error, attempts, now).await? {
                cancelled += 1;
            }
        }

        info!(cancelled, "provider disconnected");
        Ok(cancelled)
    }

    /// Pending, processing and recent failure counts per provider.
    pub async fn queue_summary(&self, user_id: Uuid) -> EngineResult<Vec<ProviderQueueSummary>> {
        let providers: Vec<String> = SyncJob::find()
            .select_only()
            .column(Column::Provider)
            .distinct()
            .filter(Column::UserId.eq(user_id))
            .order_by_asc(Column::Provider)
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut summaries = Vec::with_capacity(providers.len());
        for provider in providers {
            let base = || {
                SyncJob::find()
                    .filter(Column::UserId.eq(user_id))
                    .filter(Column::Provider.eq(provider.as_str()))
            };

            let pending = base()
                .filter(Column::Status.eq(JobStatus::Pending.as_str()))
                .count(&*self.db)
                .await?;
            let processing = base()
                .filter(Column::Status.eq(JobStatus::Processing.as_str()))
                .count(&*self.db)
                .await?;

            let last_success = base()
                .filter(Column::Status.eq(JobStatus::Completed.as_str()))
                .order_by_desc(Column::CompletedAt)
                .one(&*self.db)
                .await?
                .and_then(|job| job.completed_at);

            let mut failed_query = base().filter(Column::Status.eq(JobStatus::Failed.as_str()));
            if let Some(since) = last_success {
                failed_query = failed_query.filter(Column::CompletedAt.gt(since));
            }
            let failed = failed_query.count(&*self.db).await?;

            summaries.push(ProviderQueueSummary {
                provider,
                pending,
                processing,
                failed,
            });
        }

        Ok(summaries)
    }

    pub async fn job(&self, job_id: Uuid) -> EngineResult<Option<sync_job::Model>> {
        Ok(SyncJob::find_by_id(job_id).one(&*self.db).await?)
    }

    /// Newest first.
    pub async fn jobs_for(
        &self,
        user_id: Uuid,
        provider: Option<&str>,
        limit: u64,
    ) -> EngineResult<Vec<sync_job::Model>> {
        let mut query = SyncJob::find().filter(Column::UserId.eq(user_id));
        if let Some(provider) = provider {
            query = query.filter(Column::Provider.eq(provider));
        }
        Ok(query
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::seconds(clamp_seconds(self.config.job_timeout_seconds))
    }

    async fn find_open(
        &self,
        user_id: Uuid,
        provider: &str,
        sync_type: &str,
    ) -> EngineResult<Option<sync_job::Model>> {
        Ok(SyncJob::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Provider.eq(provider))
            .filter(Column::SyncType.eq(sync_type))
            .filter(Column::Status.is_in([
                JobStatus::Pending.as_str(),
                JobStatus::Processing.as_str(),
            ]))
            .one(&*self.db)
            .await?)
    }

    async fn complete(
        &self,
        job: sync_job::Model,
        outcome: SyncOutcome,
        now: DateTime<Utc>,
    ) -> EngineResult<ReportOutcome> {
        let result = SyncJob::update_many()
            .col_expr(Column::Status, Expr::value(JobStatus::Completed.as_str()))
            .col_expr(Column::CompletedAt, Expr::value(Some(to_db_time(now))))
            .col_expr(Column::ErrorMessage, Expr::value(Option::<String>::None))
            .col_expr(Column::ErrorKind, Expr::value(Option::<String>::None))
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
            .filter(Column::Id.eq(job.id))
            .filter(Column::Status.eq(JobStatus::Processing.as_str()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(ReportOutcome::Ignored);
        }

        counter!("sync_jobs_completed_total", "provider" => job.provider.clone()).increment(1);
        info!(
            job_id = %job.id,
            provider = %job.provider,
            records = outcome.records_synced,
            "sync job completed"
        );

        self.events
            .append(
                NewEvent {
                    user_id: job.user_id,
                    provider: job.provider.clone(),
                    event_type: EventType::SyncCompleted,
                    event_data: json!({
                        "job_id": job.id,
                        "sync_type": job.sync_type,
                        "records_synced": outcome.records_synced,
                        "attempt": job.attempt_count + 1,
                        "details": outcome.details,
                    }),
                },
                now,
            )
            .await?;
        self.analytics
            .invalidate(job.user_id, &job.provider, None)
            .await?;
        self.providers
            .set_status_if_connected(job.user_id, &job.provider, ProviderStatus::Active, now)
            .await?;
        self.schedules
            .record_outcome(job.user_id, &job.provider, true, now)
            .await?;

        Ok(ReportOutcome::Completed)
    }

    async fn fail(
        &self,
        job: sync_job::Model,
        error: SyncError,
        now: DateTime<Utc>,
    ) -> EngineResult<ReportOutcome> {
        let attempts = job.attempt_count.saturating_add(1);
        let max_attempts = i32::try_from(self.config.max_attempts).unwrap_or(i32::MAX);

        if error.kind.is_retryable() && attempts < max_attempts {
            let delay = self
                .backoff
                .delay(&job.provider, u32::try_from(attempts).unwrap_or(1), &error);
            let next_at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);

            let result = SyncJob::update_many()
                .col_expr(Column::Status, Expr::value(JobStatus::Pending.as_str()))
                .col_expr(Column::AttemptCount, Expr::value(attempts))
                .col_expr(Column::ScheduledFor, Expr::value(to_db_time(next_at)))
                .col_expr(
                    Column::StartedAt,
                    Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
                )
                .col_expr(Column::ErrorMessage, Expr::value(Some(error.to_string())))
                .col_expr(Column::ErrorKind, Expr::value(Some(error.kind.as_str().to_string())))
                .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
                .filter(Column::Id.eq(job.id))
                .filter(Column::Status.eq(JobStatus::Processing.as_str()))
                .exec(&*self.db)
                .await?;
            if result.rows_affected == 0 {
                return Ok(ReportOutcome::Ignored);
            }

            counter!("sync_jobs_retried_total", "provider" => job.provider.clone()).increment(1);
            info!(
                job_id = %job.id,
                provider = %job.provider,
                attempt = attempts,
                kind = error.kind.as_str(),
                retry_at = %next_at,
                "sync attempt failed, retry scheduled"
            );
            return Ok(ReportOutcome::Retrying { next_at });
        }

        if self.terminate(job, &error, attempts, now).await? {
            Ok(ReportOutcome::Failed)
        } else {
            Ok(ReportOutcome::Ignored)
        }
    }

    /// Moves an open job to `failed` and applies the failure side effects.
    /// Returns false if the job left its observed status in the meantime.
    async fn terminate(
        &self,
        job: sync_job::Model,
        error: &SyncError,
        attempts: i32,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let message = error.to_string();
        let result = SyncJob::update_many()
            .col_expr(Column::Status, Expr::value(JobStatus::Failed.as_str()))
            .col_expr(Column::AttemptCount, Expr::value(attempts))
            .col_expr(Column::CompletedAt, Expr::value(Some(to_db_time(now))))
            .col_expr(Column::ErrorMessage, Expr::value(Some(message.clone())))
            .col_expr(Column::ErrorKind, Expr::value(Some(error.kind.as_str().to_string())))
            .col_expr(Column::UpdatedAt, Expr::value(to_db_time(now)))
            .filter(Column::Id.eq(job.id))
            .filter(Column::Status.eq(job.status.as_str()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(false);
        }

        counter!(
            "sync_jobs_failed_total",
            "provider" => job.provider.clone(),
            "kind" => error.kind.as_str()
        )
        .increment(1);
        warn!(
            job_id = %job.id,
            provider = %job.provider,
            attempts,
            kind = error.kind.as_str(),
            error = %message,
            "sync job failed"
        );

        let error_json = serde_json::to_value(error)
            .unwrap_or_else(|_| json!({ "type": error.kind.as_str() }));
        self.events
            .append(
                NewEvent {
                    user_id: job.user_id,
                    provider: job.provider.clone(),
                    event_type: EventType::SyncFailed,
                    event_data: json!({
                        "job_id": job.id,
                        "sync_type": job.sync_type,
                        "attempt_count": attempts,
                        "error": error_json,
                    }),
                },
                now,
            )
            .await?;

        if error.kind.raises_alert() {
            let kind = if error.kind == SyncErrorKind::AuthExpired {
                KIND_AUTH_EXPIRED
            } else {
                KIND_SYNC_FAILED
            };
            self.alerts
                .raise(job.user_id, &job.provider, kind, &message, Some(job.id), now)
                .await?;
        }

        if error.kind.marks_provider_error() {
            self.providers
                .set_status_if_connected(job.user_id, &job.provider, ProviderStatus::Error, now)
                .await?;
        }

        if error.kind != SyncErrorKind::Cancelled {
            self.schedules
                .record_outcome(job.user_id, &job.provider, false, now)
                .await?;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::EmptyMetricSource;
    use chrono::TimeZone;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn manager() -> SyncQueueManager {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let db = Arc::new(db);
        let config = AppConfig::default();
        let analytics = Arc::new(AnalyticsCacheManager::new(
            db.clone(),
            Arc::new(EmptyMetricSource),
            config.analytics.clone(),
        ));
        SyncQueueManager::new(db, &config, analytics)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
    }

    fn request(user_id: Uuid, provider: &str, sync_type: &str, priority: i32) -> EnqueueRequest {
        EnqueueRequest {
            user_id,
            provider: provider.to_string(),
            sync_type: sync_type.to_string(),
            priority: Some(priority),
            scheduled_for: None,
        }
    }

    #[tokio::test]
    async fn insert_racing_an_open_job_returns_it() {
        let queue = manager().await;
        let user = Uuid::new_v4();

        let first = queue
            .enqueue(request(user, "a", SYNC_TYPE_FULL, 0), t0())
            .await
            .unwrap();
        let raced = queue
            .insert_open(&request(user, "a", SYNC_TYPE_FULL, 0), t0())
            .await
            .unwrap();

        assert!(!raced.created);
        assert_eq!(raced.job_id, first.job_id);
        assert_eq!(queue.jobs_for(user, Some("a"), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_candidates_skip_provider_already_in_flight() {
        let queue = manager().await;
        let user = Uuid::new_v4();

        queue
            .enqueue(request(user, "a", SYNC_TYPE_FULL, 9), t0())
            .await
            .unwrap();
        let incremental = queue
            .enqueue(request(user, "a", SYNC_TYPE_INCREMENTAL, 8), t0())
            .await
            .unwrap();
        queue
            .enqueue(request(user, "b", SYNC_TYPE_FULL, 1), t0())
            .await
            .unwrap();

        let stale = queue.runnable_candidates(t0()).await.unwrap();
        assert_eq!(stale.len(), 3);

        let first = queue.dequeue_next(t0()).await.unwrap().unwrap();
        assert_eq!(first.provider, "a");
        assert_eq!(first.sync_type, SYNC_TYPE_FULL);

        let claimed = queue.claim_first(stale, t0()).await.unwrap().unwrap();
        assert_eq!(claimed.provider, "b");

        let untouched = queue.job(incremental.job_id).await.unwrap().unwrap();
        assert_eq!(untouched.job_status(), Some(JobStatus::Pending));
    }
}
