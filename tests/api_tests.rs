//! End-to-end API flows over the full router.

mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use rotation_sync::adapters::{AdapterRegistry, SyncOutcome};
use rotation_sync::db::StoreHealth;
use rotation_sync::server::{AppState, create_app};
use rotation_sync::sync::SyncWorker;
use rotation_sync::telemetry::TRACE_ID_HEADER;
use serde_json::{Value, json};
use test_utils::{CountingSource, ScriptedAdapter, setup_test_db_arc, test_config};
use tower::ServiceExt;
use uuid::Uuid;

async fn test_state() -> AppState {
    let db = setup_test_db_arc().await.unwrap();
    AppState::new(
        Arc::new(test_config()),
        db,
        Arc::new(CountingSource::default()),
        StoreHealth::new(),
    )
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn openapi_document_lists_user_routes() {
    let app = create_app(test_state().await);
    let (status, _, body) = call(&app, get("/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    assert!(paths.contains_key("/users/{user_id}/rotation"));
    assert!(paths.contains_key("/users/{user_id}/sync"));
    assert!(paths.contains_key("/users/{user_id}/analytics/refresh"));
    assert!(paths.contains_key("/users/{user_id}/alerts/{alert_id}/ack"));
}

#[tokio::test]
async fn trace_id_is_echoed_and_reported_in_errors() {
    let app = create_app(test_state().await);
    let user = Uuid::new_v4();
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/users/{user}/rotation/speed"))
        .header("content-type", "application/json")
        .header(TRACE_ID_HEADER, "trace-abc")
        .body(Body::from(json!({ "interval_seconds": 0 }).to_string()))
        .unwrap();

    let (status, headers, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers[TRACE_ID_HEADER], "trace-abc");
    assert_eq!(
        headers["content-type"],
        "application/problem+json"
    );
    assert_eq!(body["trace_id"], "trace-abc");
}

#[tokio::test]
async fn connect_sync_and_observe_events() {
    let state = test_state().await;
    let app = create_app(state.clone());
    let user = Uuid::new_v4();

    let (status, _, _) = call(
        &app,
        post(
            &format!("/users/{user}/providers/oura/connect"),
            json!({ "display_name": "Oura Ring" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut registry = AdapterRegistry::new();
    registry.register(
        "oura",
        Arc::new(ScriptedAdapter::new(vec![Ok(SyncOutcome::with_records(12))])),
    );
    let worker = SyncWorker::new(
        state.queue.clone(),
        Arc::new(registry),
        state.health.clone(),
        state.config.worker.clone(),
    );
    assert!(worker.process_next().await.unwrap().is_some());

    let (status, _, body) = call(&app, get(&format!("/users/{user}/events?provider=oura"))).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["sync_completed", "connected"]);

    let (_, _, jobs) = call(&app, get(&format!("/users/{user}/sync/jobs?provider=oura"))).await;
    assert_eq!(jobs["jobs"][0]["status"], "completed");
}

#[tokio::test]
async fn refresh_analytics_for_all_connected_providers() {
    let state = test_state().await;
    let app = create_app(state);
    let user = Uuid::new_v4();

    for slug in ["fitbit", "oura"] {
        call(
            &app,
            post(
                &format!("/users/{user}/providers/{slug}/connect"),
                json!({ "display_name": slug }),
            ),
        )
        .await;
    }

    let (status, _, body) = call(
        &app,
        post(
            &format!("/users/{user}/analytics/refresh"),
            json!({ "period": "week" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshed"].as_array().unwrap().len(), 2);
    assert_eq!(body["failed"], json!([]));
    assert_eq!(body["refreshed"][0]["stats"]["count"], 0);
}

#[tokio::test]
async fn unknown_period_is_rejected() {
    let app = create_app(test_state().await);
    let user = Uuid::new_v4();
    let (status, _, body) = call(
        &app,
        post(
            &format!("/users/{user}/analytics/refresh"),
            json!({ "period": "decade" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}
