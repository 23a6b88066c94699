//! # Rotation API Handlers
//!
//! Read and drive a user's display rotation.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::rotation::{MAX_INTERVAL_SECONDS, RotationPhase, RotationSnapshot};
use crate::server::AppState;

/// Rotation state with the provider currently on display
#[derive(Debug, Serialize, ToSchema)]
pub struct RotationResponse {
    #[serde(flatten)]
    pub state: RotationSnapshot,
    /// Provider at `current_index`, null when the rotation is empty
    #[schema(example = "oura")]
    pub current_provider: Option<String>,
    pub phase: RotationPhase,
}

impl From<RotationSnapshot> for RotationResponse {
    fn from(state: RotationSnapshot) -> Self {
        Self {
            current_provider: state.current().map(str::to_owned),
            phase: state.phase(),
            state,
        }
    }
}

/// Request body for replacing the rotation
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfigureRotationRequest {
    /// Provider slugs in display order, no duplicates
    #[schema(example = json!(["fitbit", "oura", "withings"]))]
    pub order: Vec<String>,
    /// Seconds each provider stays on screen
    #[schema(example = 30, minimum = 1, maximum = 2147483647)]
    pub interval_seconds: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Request body for changing the rotation speed
#[derive(Debug, Deserialize, ToSchema)]
pub struct RotationSpeedRequest {
    #[schema(example = 60, minimum = 1, maximum = 2147483647)]
    pub interval_seconds: u32,
}

/// Current rotation for the user, created empty on first access
#[utoipa::path(
    get,
    path = "/users/{user_id}/rotation",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Current rotation", body = RotationResponse),
        (status = 503, description = "Store unavailable and no cached state", body = ApiError)
    ),
    tag = "rotation"
)]
pub async fn get_rotation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RotationResponse>, ApiError> {
    let snapshot = state.rotation.snapshot(user_id, Utc::now()).await?;
    Ok(Json(snapshot.into()))
}

/// Replace the rotation order, interval and enabled flag
#[utoipa::path(
    put,
    path = "/users/{user_id}/rotation",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    request_body = ConfigureRotationRequest,
    responses(
        (status = 200, description = "Updated rotation", body = RotationResponse),
        (status = 400, description = "Duplicate providers or out-of-range interval", body = ApiError),
        (status = 409, description = "Concurrent update conflict", body = ApiError)
    ),
    tag = "rotation"
)]
pub async fn configure_rotation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<ConfigureRotationRequest>, JsonRejection>,
) -> Result<Json<RotationResponse>, ApiError> {
    let Json(body) = payload?;
    let snapshot = state
        .rotation
        .configure(
            user_id,
            body.order,
            body.interval_seconds,
            body.enabled,
            Utc::now(),
        )
        .await?;
    Ok(Json(snapshot.into()))
}

/// Advance to the next provider (manual override)
#[utoipa::path(
    post,
    path = "/users/{user_id}/rotation/next",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Updated rotation", body = RotationResponse),
        (status = 409, description = "Concurrent update conflict", body = ApiError)
    ),
    tag = "rotation"
)]
pub async fn advance_rotation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RotationResponse>, ApiError> {
    let snapshot = state.rotation.next(user_id, Utc::now()).await?;
    Ok(Json(snapshot.into()))
}

/// Go back to the previous provider (manual override)
#[utoipa::path(
    post,
    path = "/users/{user_id}/rotation/previous",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Updated rotation", body = RotationResponse),
        (status = 409, description = "Concurrent update conflict", body = ApiError)
    ),
    tag = "rotation"
)]
pub async fn previous_source(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RotationResponse>, ApiError> {
    let snapshot = state.rotation.previous(user_id, Utc::now()).await?;
    Ok(Json(snapshot.into()))
}

/// Pause a running rotation or resume a paused one
#[utoipa::path(
    post,
    path = "/users/{user_id}/rotation/toggle",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Updated rotation", body = RotationResponse),
        (status = 409, description = "Concurrent update conflict", body = ApiError)
    ),
    tag = "rotation"
)]
pub async fn toggle_rotation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RotationResponse>, ApiError> {
    let snapshot = state.rotation.toggle(user_id, Utc::now()).await?;
    Ok(Json(snapshot.into()))
}

/// Change how long each provider stays on screen
#[utoipa::path(
    put,
    path = "/users/{user_id}/rotation/speed",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    request_body = RotationSpeedRequest,
    responses(
        (status = 200, description = "Updated rotation", body = RotationResponse),
        (status = 400, description = "Out-of-range interval", body = ApiError),
        (status = 409, description = "Concurrent update conflict", body = ApiError)
    ),
    tag = "rotation"
)]
pub async fn set_rotation_speed(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<RotationSpeedRequest>, JsonRejection>,
) -> Result<Json<RotationResponse>, ApiError> {
    let Json(body) = payload?;
    if body.interval_seconds == 0 || body.interval_seconds > MAX_INTERVAL_SECONDS {
        return Err(validation_error(
            "Invalid interval",
            serde_json::json!({
                "interval_seconds": format!("Must be between 1 and {MAX_INTERVAL_SECONDS}")
            }),
        ));
    }

    let snapshot = state
        .rotation
        .set_interval(user_id, body.interval_seconds, Utc::now())
        .await?;
    Ok(Json(snapshot.into()))
}
