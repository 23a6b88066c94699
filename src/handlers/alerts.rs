//! Sync alert handlers.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::sync_alert;
use crate::server::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertView {
    pub id: Uuid,
    pub provider: String,
    /// `sync_failed` or `auth_expired`
    pub kind: String,
    pub message: String,
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl From<sync_alert::Model> for AlertView {
    fn from(model: sync_alert::Model) -> Self {
        Self {
            id: model.id,
            provider: model.provider,
            kind: model.kind,
            message: model.message,
            job_id: model.job_id,
            created_at: model.created_at.with_timezone(&Utc),
            acknowledged_at: model.acknowledged_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertView>,
}

/// Unacknowledged alerts, newest first
#[utoipa::path(
    get,
    path = "/users/{user_id}/alerts",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Active alerts", body = AlertsResponse)
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let alerts = state.alerts.active(user_id).await?;
    Ok(Json(AlertsResponse {
        alerts: alerts.into_iter().map(AlertView::from).collect(),
    }))
}

/// Dismiss an alert
#[utoipa::path(
    post,
    path = "/users/{user_id}/alerts/{alert_id}/ack",
    params(
        ("user_id" = Uuid, Path, description = "User identifier"),
        ("alert_id" = Uuid, Path, description = "Alert identifier")
    ),
    responses(
        (status = 200, description = "Acknowledged alert", body = AlertView),
        (status = 404, description = "Alert not found", body = ApiError)
    ),
    tag = "alerts"
)]
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path((user_id, alert_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<AlertView>, ApiError> {
    let alert = state
        .alerts
        .acknowledge(user_id, alert_id, Utc::now())
        .await?;
    Ok(Json(alert.into()))
}
