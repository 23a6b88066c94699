//! Analytics refresh handler.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::analytics::{Period, RefreshReport};
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshAnalyticsRequest {
    /// Limit the refresh to one provider; every provider of the user when absent
    #[schema(example = "oura")]
    pub provider: Option<String>,
    pub period: Period,
    /// Recompute even when the cached entry is still fresh
    #[serde(default)]
    pub force: bool,
}

/// Return (and recompute when stale or forced) summary statistics
#[utoipa::path(
    post,
    path = "/users/{user_id}/analytics/refresh",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    request_body = RefreshAnalyticsRequest,
    responses(
        (status = 200, description = "Statistics per provider", body = RefreshReport),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 502, description = "Metric source failed", body = ApiError)
    ),
    tag = "analytics"
)]
pub async fn refresh_analytics(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<RefreshAnalyticsRequest>, JsonRejection>,
) -> Result<Json<RefreshReport>, ApiError> {
    let Json(body) = payload?;
    let now = Utc::now();

    let report = match body.provider {
        Some(provider) => {
            let snapshot = state
                .analytics
                .get_or_compute(user_id, &provider, body.period, body.force, now)
                .await?;
            RefreshReport {
                refreshed: vec![snapshot],
                failed: Vec::new(),
            }
        }
        None => {
            state
                .analytics
                .refresh_all(user_id, body.period, body.force, now)
                .await?
        }
    };

    Ok(Json(report))
}
