//! Sync queue semantics: dedup, single-flight, retries, isolation and the
//! connect/disconnect hooks.

mod test_utils;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use rotation_sync::adapters::{AdapterRegistry, SyncError, SyncOutcome};
use rotation_sync::analytics::EmptyMetricSource;
use rotation_sync::db::{StoreHealth, to_db_time};
use rotation_sync::error::is_unique_violation;
use rotation_sync::models::sync_job::{self, JobStatus};
use rotation_sync::repositories::{
    AlertRepository, EventLog, ProviderRepository, ScheduleRepository,
};
use rotation_sync::sync::{BackgroundRefresh, EnqueueRequest, ReportOutcome, SyncWorker};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use test_utils::{ScriptedAdapter, queue_with_source, setup_test_db_arc, t0, test_config};
use uuid::Uuid;

fn request(user_id: Uuid, provider: &str, priority: Option<i32>) -> EnqueueRequest {
    EnqueueRequest {
        user_id,
        provider: provider.to_string(),
        sync_type: "full".to_string(),
        priority,
        scheduled_for: None,
    }
}

#[tokio::test]
async fn duplicate_enqueue_keeps_one_pending_row() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    let first = queue.enqueue(request(user, "a", Some(5)), t0()).await.unwrap();
    let second = queue.enqueue(request(user, "a", Some(5)), t0()).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.job_id, second.job_id);

    let jobs = queue.jobs_for(user, Some("a"), 10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, "pending");
    assert_eq!(jobs[0].priority, 5);
}

#[tokio::test]
async fn different_sync_types_queue_separately() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "a", None), t0()).await.unwrap();
    let mut incremental = request(user, "a", None);
    incremental.sync_type = "incremental".to_string();
    let result = queue.enqueue(incremental, t0()).await.unwrap();

    assert!(result.created);
    assert_eq!(queue.jobs_for(user, Some("a"), 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_provider_is_rejected() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    assert!(queue.enqueue(request(Uuid::new_v4(), " ", None), t0()).await.is_err());
}

#[tokio::test]
async fn at_most_one_processing_job_per_provider() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "a", None), t0()).await.unwrap();
    let mut incremental = request(user, "a", None);
    incremental.sync_type = "incremental".to_string();
    queue.enqueue(incremental, t0()).await.unwrap();

    let claimed = queue.dequeue_next(t0()).await.unwrap();
    assert!(claimed.is_some());
    assert!(queue.dequeue_next(t0()).await.unwrap().is_none());

    let summary = queue.queue_summary(user).await.unwrap();
    assert_eq!(summary[0].processing, 1);
    assert_eq!(summary[0].pending, 1);
}

#[tokio::test]
async fn database_rejects_second_processing_job_for_provider() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db.clone(), &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "a", Some(5)), t0()).await.unwrap();
    let mut incremental = request(user, "a", Some(5));
    incremental.sync_type = "incremental".to_string();
    let second = queue.enqueue(incremental, t0()).await.unwrap();
    queue.enqueue(request(user, "b", Some(1)), t0()).await.unwrap();

    let running = queue.dequeue_next(t0()).await.unwrap().unwrap();
    assert_eq!(running.provider, "a");

    let forced = sync_job::Entity::update_many()
        .col_expr(
            sync_job::Column::Status,
            Expr::value(JobStatus::Processing.as_str()),
        )
        .filter(sync_job::Column::Id.eq(second.job_id))
        .exec(&*db)
        .await;
    let err = forced.expect_err("single-flight index must reject the claim");
    assert!(is_unique_violation(&err));

    let next = queue.dequeue_next(t0()).await.unwrap().unwrap();
    assert_eq!(next.provider, "b");
    let waiting = queue.job(second.job_id).await.unwrap().unwrap();
    assert_eq!(waiting.job_status(), Some(JobStatus::Pending));
}

#[tokio::test]
async fn database_rejects_duplicate_open_job() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db.clone(), &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    let first = queue.enqueue(request(user, "a", None), t0()).await.unwrap();

    let ts = to_db_time(t0());
    let duplicate = sync_job::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user),
        provider: Set("a".to_string()),
        priority: Set(0),
        status: Set(JobStatus::Pending.as_str().to_string()),
        sync_type: Set("full".to_string()),
        scheduled_for: Set(ts),
        started_at: Set(None),
        completed_at: Set(None),
        error_message: Set(None),
        error_kind: Set(None),
        attempt_count: Set(0),
        created_at: Set(ts),
        updated_at: Set(ts),
    };
    let err = duplicate
        .insert(&*db)
        .await
        .expect_err("open-per-type index must reject the row");
    assert!(is_unique_violation(&err));

    let again = queue.enqueue(request(user, "a", None), t0()).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.job_id, first.job_id);
}

#[tokio::test]
async fn dequeue_orders_by_priority_then_schedule() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "low", Some(1)), t0()).await.unwrap();
    queue.enqueue(request(user, "high", Some(9)), t0()).await.unwrap();
    let mut future = request(user, "future", Some(20));
    future.scheduled_for = Some(t0() + Duration::hours(1));
    queue.enqueue(future, t0()).await.unwrap();

    let first = queue.dequeue_next(t0()).await.unwrap().unwrap();
    let second = queue.dequeue_next(t0()).await.unwrap().unwrap();
    assert_eq!(first.provider, "high");
    assert_eq!(second.provider, "low");
    assert!(queue.dequeue_next(t0()).await.unwrap().is_none());
}

#[tokio::test]
async fn failing_job_backs_off_then_fails_terminally() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db.clone(), &test_config(), Arc::new(EmptyMetricSource));
    let events = EventLog::new(db.clone());
    let alerts = AlertRepository::new(db);
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "b", None), t0()).await.unwrap();

    let job = queue.dequeue_next(t0()).await.unwrap().unwrap();
    let outcome = queue
        .report_result(job.id, Err(SyncError::transient("boom")), t0())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReportOutcome::Retrying {
            next_at: t0() + Duration::seconds(1)
        }
    );
    assert!(queue.dequeue_next(t0()).await.unwrap().is_none());

    let at = t0() + Duration::seconds(1);
    let job = queue.dequeue_next(at).await.unwrap().unwrap();
    let outcome = queue
        .report_result(job.id, Err(SyncError::transient("boom")), at)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReportOutcome::Retrying {
            next_at: at + Duration::seconds(2)
        }
    );

    let at = at + Duration::seconds(2);
    let job = queue.dequeue_next(at).await.unwrap().unwrap();
    let outcome = queue
        .report_result(job.id, Err(SyncError::transient("boom")), at)
        .await
        .unwrap();
    assert_eq!(outcome, ReportOutcome::Failed);

    let stored = queue.job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.job_status(), Some(JobStatus::Failed));
    assert_eq!(stored.attempt_count, 3);
    assert_eq!(stored.error_kind.as_deref(), Some("transient"));
    assert!(queue.dequeue_next(at + Duration::days(1)).await.unwrap().is_none());

    let failed_events: Vec<_> = events
        .recent(user, 50, Some("b"))
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == "sync_failed")
        .collect();
    assert_eq!(failed_events.len(), 1);
    assert_eq!(failed_events[0].event_data["attempt_count"], 3);

    let active = alerts.active(user).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].kind, "sync_failed");

    let summary = queue.queue_summary(user).await.unwrap();
    assert_eq!(summary[0].failed, 1);
}

#[tokio::test]
async fn auth_expired_is_terminal_and_marks_provider() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db.clone(), &test_config(), Arc::new(EmptyMetricSource));
    let providers = ProviderRepository::new(db.clone());
    let alerts = AlertRepository::new(db);
    let user = Uuid::new_v4();

    queue
        .handle_connect(user, "oura", "Oura", None, t0())
        .await
        .unwrap();
    let job = queue.dequeue_next(t0()).await.unwrap().unwrap();
    let outcome = queue
        .report_result(job.id, Err(SyncError::auth_expired("token revoked")), t0())
        .await
        .unwrap();
    assert_eq!(outcome, ReportOutcome::Failed);

    let provider = providers.find(user, "oura").await.unwrap().unwrap();
    assert_eq!(provider.status, "error");
    let active = alerts.active(user).await.unwrap();
    assert_eq!(active[0].kind, "auth_expired");
}

#[tokio::test]
async fn rate_limit_honours_retry_after_and_floor() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "a", None), t0()).await.unwrap();
    let job = queue.dequeue_next(t0()).await.unwrap().unwrap();
    let outcome = queue
        .report_result(job.id, Err(SyncError::rate_limited(Some(45))), t0())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReportOutcome::Retrying {
            next_at: t0() + Duration::seconds(45)
        }
    );

    let at = t0() + Duration::seconds(45);
    let job = queue.dequeue_next(at).await.unwrap().unwrap();
    let outcome = queue
        .report_result(job.id, Err(SyncError::rate_limited(None)), at)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReportOutcome::Retrying {
            next_at: at + Duration::seconds(10)
        }
    );
}

#[tokio::test]
async fn oversized_retry_after_is_capped() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "a", Some(5)), t0()).await.unwrap();
    queue.enqueue(request(user, "b", Some(1)), t0()).await.unwrap();

    let job = queue.dequeue_next(t0()).await.unwrap().unwrap();
    assert_eq!(job.provider, "a");
    let outcome = queue
        .report_result(job.id, Err(SyncError::rate_limited(Some(u64::MAX))), t0())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReportOutcome::Retrying {
            next_at: t0() + Duration::seconds(60)
        }
    );

    let other = queue.dequeue_next(t0()).await.unwrap().unwrap();
    assert_eq!(other.provider, "b");
}

#[tokio::test]
async fn failing_provider_does_not_block_others() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "bad", Some(10)), t0()).await.unwrap();
    queue.enqueue(request(user, "good", Some(1)), t0()).await.unwrap();

    let bad = queue.dequeue_next(t0()).await.unwrap().unwrap();
    assert_eq!(bad.provider, "bad");
    queue
        .report_result(bad.id, Err(SyncError::permanent("misconfigured")), t0())
        .await
        .unwrap();

    let good = queue.dequeue_next(t0()).await.unwrap().unwrap();
    assert_eq!(good.provider, "good");
    let outcome = queue
        .report_result(good.id, Ok(SyncOutcome::with_records(3)), t0())
        .await
        .unwrap();
    assert_eq!(outcome, ReportOutcome::Completed);
}

#[tokio::test]
async fn late_report_after_completion_is_ignored() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "a", None), t0()).await.unwrap();
    let job = queue.dequeue_next(t0()).await.unwrap().unwrap();
    queue
        .report_result(job.id, Ok(SyncOutcome::default()), t0())
        .await
        .unwrap();
    let again = queue
        .report_result(job.id, Err(SyncError::transient("late")), t0())
        .await
        .unwrap();
    assert_eq!(again, ReportOutcome::Ignored);
}

#[tokio::test]
async fn timed_out_jobs_are_reaped_into_retry() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "a", None), t0()).await.unwrap();
    let job = queue.dequeue_next(t0()).await.unwrap().unwrap();

    assert_eq!(queue.reap_timed_out(t0() + Duration::seconds(299)).await.unwrap(), 0);
    let reaped_at = t0() + Duration::seconds(300);
    assert_eq!(queue.reap_timed_out(reaped_at).await.unwrap(), 1);

    let stored = queue.job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.job_status(), Some(JobStatus::Pending));
    assert_eq!(stored.error_kind.as_deref(), Some("timeout"));
    assert_eq!(stored.attempt_count, 1);
}

#[tokio::test]
async fn disconnect_cancels_open_jobs_and_pauses_refresh() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db.clone(), &test_config(), Arc::new(EmptyMetricSource));
    let schedules = ScheduleRepository::new(db.clone());
    let alerts = AlertRepository::new(db.clone());
    let providers = ProviderRepository::new(db);
    let user = Uuid::new_v4();

    queue
        .handle_connect(user, "oura", "Oura", None, t0())
        .await
        .unwrap();
    let job = queue.dequeue_next(t0()).await.unwrap().unwrap();

    let cancelled = queue.handle_disconnect(user, "oura", t0()).await.unwrap();
    assert_eq!(cancelled, 1);

    let stored = queue.job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.job_status(), Some(JobStatus::Failed));
    assert_eq!(stored.error_kind.as_deref(), Some("cancelled"));

    // the adapter finishing afterwards changes nothing
    let late = queue
        .report_result(job.id, Ok(SyncOutcome::default()), t0())
        .await
        .unwrap();
    assert_eq!(late, ReportOutcome::Ignored);

    let provider = providers.find(user, "oura").await.unwrap().unwrap();
    assert_eq!(provider.status, "disconnected");
    let schedule = schedules.find(user, "oura").await.unwrap().unwrap();
    assert!(schedule.next_scheduled_at.is_none());
    assert!(alerts.active(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn disconnect_of_unknown_provider_is_not_found() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let result = queue.handle_disconnect(Uuid::new_v4(), "nope", t0()).await;
    assert!(matches!(
        result,
        Err(rotation_sync::error::EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn worker_runs_adapter_and_completes_job() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db.clone(), &test_config(), Arc::new(EmptyMetricSource));
    let events = EventLog::new(db);
    let user = Uuid::new_v4();

    let adapter = Arc::new(ScriptedAdapter::new(vec![
        Err(SyncError::transient("flaky")),
        Ok(SyncOutcome::with_records(7)),
    ]));
    let mut registry = AdapterRegistry::new();
    registry.register("oura", adapter.clone());
    let worker = SyncWorker::new(
        queue.clone(),
        Arc::new(registry),
        StoreHealth::new(),
        test_config().worker,
    );

    queue.enqueue(request(user, "oura", None), t0()).await.unwrap();

    let first = worker.process_next().await.unwrap();
    assert!(matches!(first, Some(ReportOutcome::Retrying { .. })));

    // retry is not due yet
    assert!(worker.process_next().await.unwrap().is_none());

    let jobs = queue.jobs_for(user, Some("oura"), 1).await.unwrap();
    assert_eq!(jobs[0].attempt_count, 1);
    assert_eq!(adapter.seen()[0].attempt, 1);
    assert!(events.recent(user, 10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn worker_without_adapter_fails_permanently() {
    let db = setup_test_db_arc().await.unwrap();
    let (queue, _) = queue_with_source(db, &test_config(), Arc::new(EmptyMetricSource));
    let worker = SyncWorker::new(
        queue.clone(),
        Arc::new(AdapterRegistry::new()),
        StoreHealth::new(),
        test_config().worker,
    );
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "unknown", None), t0()).await.unwrap();
    let outcome = worker.process_next().await.unwrap();
    assert_eq!(outcome, Some(ReportOutcome::Failed));
}

#[tokio::test]
async fn worker_times_out_slow_adapter() {
    let db = setup_test_db_arc().await.unwrap();
    let mut config = test_config();
    config.sync.job_timeout_seconds = 1;
    let (queue, _) = queue_with_source(db, &config, Arc::new(EmptyMetricSource));
    let mut registry = AdapterRegistry::new();
    registry.register("slow", Arc::new(ScriptedAdapter::slow(StdDuration::from_secs(5))));
    let worker = SyncWorker::new(
        queue.clone(),
        Arc::new(registry),
        StoreHealth::new(),
        config.worker,
    );
    let user = Uuid::new_v4();

    queue.enqueue(request(user, "slow", None), t0()).await.unwrap();
    let outcome = worker.process_next().await.unwrap();
    assert!(matches!(outcome, Some(ReportOutcome::Retrying { .. })));

    let jobs = queue.jobs_for(user, Some("slow"), 1).await.unwrap();
    assert_eq!(jobs[0].error_kind.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn background_refresh_enqueues_due_providers_once() {
    let db = setup_test_db_arc().await.unwrap();
    let config = test_config();
    let (queue, _) = queue_with_source(db.clone(), &config, Arc::new(EmptyMetricSource));
    let refresh = BackgroundRefresh::new(
        queue.clone(),
        ScheduleRepository::new(db),
        StoreHealth::new(),
        config.worker.clone(),
    );
    let user = Uuid::new_v4();

    queue
        .handle_connect(user, "oura", "Oura", None, t0())
        .await
        .unwrap();

    let early = refresh.tick(t0()).await.unwrap();
    assert_eq!(early.due, 0);

    let due_at = t0() + Duration::seconds(config.worker.refresh_interval_seconds as i64);
    let stats = refresh.tick(due_at).await.unwrap();
    assert_eq!(stats.due, 1);
    assert_eq!(stats.claimed, 1);
    assert_eq!(stats.enqueued, 1);

    // next refresh pushed out by one interval
    let again = refresh.tick(due_at).await.unwrap();
    assert_eq!(again.due, 0);

    let jobs = queue.jobs_for(user, Some("oura"), 10).await.unwrap();
    assert!(jobs.iter().any(|j| j.sync_type == "incremental"));
}
