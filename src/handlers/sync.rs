//! # Sync API Handlers
//!
//! Enqueue syncs and read queue state for passive badges.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::server::AppState;
use crate::sync::{EnqueueRequest, EnqueueResult, ProviderQueueSummary, SyncJobView};

/// Query parameters for listing jobs
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListJobsQuery {
    /// Optional provider filter
    pub provider: Option<String>,
    /// Maximum number of jobs to return (default: 50, max: 100)
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueueSummaryResponse {
    pub providers: Vec<ProviderQueueSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobsResponse {
    pub jobs: Vec<SyncJobView>,
}

/// Request a sync for one provider
///
/// Returns 201 with the new job, or 200 with the id of an equivalent job that
/// is already pending or processing.
#[utoipa::path(
    post,
    path = "/users/{user_id}/sync",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    request_body = EnqueueRequest,
    responses(
        (status = 201, description = "Job enqueued", body = EnqueueResult),
        (status = 200, description = "Equivalent job already queued", body = EnqueueResult),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn enqueue_sync(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnqueueResult>), ApiError> {
    let Json(mut request) = payload?;
    request.user_id = user_id;

    let result = state.queue.enqueue(request, Utc::now()).await?;
    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)))
}

/// Pending, processing and failed job counts per provider
#[utoipa::path(
    get,
    path = "/users/{user_id}/sync/summary",
    params(("user_id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Queue summary", body = QueueSummaryResponse)
    ),
    tag = "sync"
)]
pub async fn get_sync_summary(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<QueueSummaryResponse>, ApiError> {
    let providers = state.queue.queue_summary(user_id).await?;
    Ok(Json(QueueSummaryResponse { providers }))
}

/// Recent jobs for the user, newest first
#[utoipa::path(
    get,
    path = "/users/{user_id}/sync/jobs",
    params(("user_id" = Uuid, Path, description = "User identifier"), ListJobsQuery),
    responses(
        (status = 200, description = "Jobs", body = JobsResponse),
        (status = 400, description = "Invalid limit", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    if !(1..=100).contains(&limit) {
        return Err(validation_error(
            "Invalid limit",
            serde_json::json!({ "limit": "Must be between 1 and 100" }),
        ));
    }

    let jobs = state
        .queue
        .jobs_for(user_id, query.provider.as_deref(), limit)
        .await?;
    Ok(Json(JobsResponse {
        jobs: jobs.into_iter().map(SyncJobView::from).collect(),
    }))
}
