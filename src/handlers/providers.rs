//! # Provider API Handlers
//!
//! Provider listing plus the hooks the connection layer calls when a user
//! connects or disconnects a provider.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::models::provider;
use crate::server::AppState;
use crate::sync::EnqueueResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderView {
    #[schema(example = "oura")]
    pub slug: String,
    pub display_name: String,
    /// `pending`, `active`, `error`, `disconnected` or `low_battery`
    #[schema(example = "active")]
    pub status: String,
    pub metadata: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

impl From<provider::Model> for ProviderView {
    fn from(model: provider::Model) -> Self {
        Self {
            slug: model.slug,
            display_name: model.display_name,
            status: model.status,
            metadata: model.metadata,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderView>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectProviderRequest {
    #[schema(example = "Oura Ring")]
    pub display_name: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DisconnectResponse {
    /// Open jobs cancelled by the disconnect
    pub cancelled_jobs: u64,
}

/// Providers of the user, by slug
#[utoipa::path(
    get,
    path = "/users/{user_id}/providers",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Providers", body = ProvidersResponse)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ProvidersResponse>, ApiError> {
    let providers = state.providers.list_for_user(user_id).await?;
    Ok(Json(ProvidersResponse {
        providers: providers.into_iter().map(ProviderView::from).collect(),
    }))
}

/// Mark a provider connected and queue its initial full sync
#[utoipa::path(
    post,
    path = "/users/{user_id}/providers/{slug}/connect",
    params(
        ("user_id" = Uuid, Path, description = "User identifier"),
        ("slug" = String, Path, description = "Provider slug")
    ),
    request_body = ConnectProviderRequest,
    responses(
        (status = 200, description = "Full sync queued", body = EnqueueResult),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn connect_provider(
    State(state): State<AppState>,
    Path((user_id, slug)): Path<(Uuid, String)>,
    payload: Result<Json<ConnectProviderRequest>, JsonRejection>,
) -> Result<Json<EnqueueResult>, ApiError> {
    let Json(body) = payload?;
    if body.display_name.trim().is_empty() {
        return Err(validation_error(
            "Invalid display name",
            serde_json::json!({ "display_name": "Must not be empty" }),
        ));
    }

    let result = state
        .queue
        .handle_connect(user_id, &slug, &body.display_name, body.metadata, Utc::now())
        .await?;
    Ok(Json(result))
}

/// Soft-disconnect a provider and cancel its open jobs
#[utoipa::path(
    post,
    path = "/users/{user_id}/providers/{slug}/disconnect",
    params(
        ("user_id" = Uuid, Path, description = "User identifier"),
        ("slug" = String, Path, description = "Provider slug")
    ),
    responses(
        (status = 200, description = "Provider disconnected", body = DisconnectResponse),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn disconnect_provider(
    State(state): State<AppState>,
    Path((user_id, slug)): Path<(Uuid, String)>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let cancelled_jobs = state
        .queue
        .handle_disconnect(user_id, &slug, Utc::now())
        .await?;
    Ok(Json(DisconnectResponse { cancelled_jobs }))
}
