//! Event log ordering and filtering, plus alert acknowledgement.

mod test_utils;

use chrono::{Duration, Utc};
use rotation_sync::error::EngineError;
use rotation_sync::models::connection_event::EventType;
use rotation_sync::models::sync_alert::KIND_SYNC_FAILED;
use rotation_sync::repositories::{AlertRepository, EventLog, NewEvent};
use serde_json::json;
use test_utils::{setup_test_db_arc, t0};
use uuid::Uuid;

fn event(user_id: Uuid, provider: &str, event_type: EventType) -> NewEvent {
    NewEvent {
        user_id,
        provider: provider.to_string(),
        event_type,
        event_data: json!({ "source": "test" }),
    }
}

#[tokio::test]
async fn recent_returns_newest_first_and_respects_limit() {
    let db = setup_test_db_arc().await.unwrap();
    let log = EventLog::new(db);
    let user = Uuid::new_v4();

    log.append(event(user, "a", EventType::Connected), t0()).await.unwrap();
    log.append(event(user, "a", EventType::SyncCompleted), t0() + Duration::seconds(5))
        .await
        .unwrap();
    log.append(event(user, "b", EventType::SyncFailed), t0() + Duration::seconds(10))
        .await
        .unwrap();

    let all = log.recent(user, 50, None).await.unwrap();
    let types: Vec<_> = all.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["sync_failed", "sync_completed", "connected"]);

    let two = log.recent(user, 2, None).await.unwrap();
    assert_eq!(two.len(), 2);

    let only_a = log.recent(user, 50, Some("a")).await.unwrap();
    assert_eq!(only_a.len(), 2);
    assert!(only_a.iter().all(|e| e.provider == "a"));
}

#[tokio::test]
async fn events_are_scoped_to_their_user() {
    let db = setup_test_db_arc().await.unwrap();
    let log = EventLog::new(db);
    let user = Uuid::new_v4();

    log.append(event(user, "a", EventType::Connected), t0()).await.unwrap();
    log.append(event(Uuid::new_v4(), "a", EventType::Connected), t0())
        .await
        .unwrap();

    assert_eq!(log.recent(user, 50, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn skewed_clock_does_not_reorder_provider_history() {
    let db = setup_test_db_arc().await.unwrap();
    let log = EventLog::new(db);
    let user = Uuid::new_v4();

    log.append(event(user, "a", EventType::Connected), t0()).await.unwrap();
    let late = log
        .append(event(user, "a", EventType::SyncCompleted), t0() - Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(late.created_at.with_timezone(&Utc), t0());

    let recent = log.recent(user, 50, Some("a")).await.unwrap();
    assert_eq!(recent[0].event_type, "sync_completed");
}

#[tokio::test]
async fn limit_outside_bounds_is_rejected() {
    let db = setup_test_db_arc().await.unwrap();
    let log = EventLog::new(db);

    assert!(matches!(
        log.recent(Uuid::new_v4(), 0, None).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        log.recent(Uuid::new_v4(), 501, None).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn acknowledged_alerts_leave_the_active_list() {
    let db = setup_test_db_arc().await.unwrap();
    let alerts = AlertRepository::new(db);
    let user = Uuid::new_v4();

    let alert = alerts
        .raise(user, "a", KIND_SYNC_FAILED, "gave up", None, t0())
        .await
        .unwrap();
    assert_eq!(alerts.active(user).await.unwrap().len(), 1);

    let acked = alerts
        .acknowledge(user, alert.id, t0() + Duration::seconds(10))
        .await
        .unwrap();
    assert!(acked.acknowledged_at.is_some());
    assert!(alerts.active(user).await.unwrap().is_empty());

    let again = alerts
        .acknowledge(user, alert.id, t0() + Duration::seconds(99))
        .await
        .unwrap();
    assert_eq!(again.acknowledged_at, acked.acknowledged_at);

    let other_user = alerts.acknowledge(Uuid::new_v4(), alert.id, t0()).await;
    assert!(matches!(other_user, Err(EngineError::NotFound { .. })));
}
