//! Connection event listing.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::connection_event;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct RecentEventsQuery {
    /// Number of events (default: 50, max: 500)
    pub limit: Option<u64>,
    /// Optional provider filter
    pub provider: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventView {
    pub id: i64,
    pub provider: String,
    #[schema(example = "sync_completed")]
    pub event_type: String,
    pub event_data: Value,
    pub created_at: DateTime<Utc>,
}

impl From<connection_event::Model> for EventView {
    fn from(model: connection_event::Model) -> Self {
        Self {
            id: model.id,
            provider: model.provider,
            event_type: model.event_type,
            event_data: model.event_data,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    pub events: Vec<EventView>,
}

/// Latest connection events, newest first
#[utoipa::path(
    get,
    path = "/users/{user_id}/events",
    params(("user_id" = Uuid, Path, description = "User identifier"), RecentEventsQuery),
    responses(
        (status = 200, description = "Recent events", body = EventsResponse),
        (status = 400, description = "Invalid limit", body = ApiError)
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RecentEventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let events = state
        .events
        .recent(user_id, query.limit.unwrap_or(50), query.provider.as_deref())
        .await?;
    Ok(Json(EventsResponse {
        events: events.into_iter().map(EventView::from).collect(),
    }))
}
