//! # Server Configuration
//!
//! Router, shared state and OpenAPI document for the rotation-sync API.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::analytics::{AnalyticsCacheManager, MetricSource};
use crate::config::AppConfig;
use crate::db::StoreHealth;
use crate::handlers;
use crate::repositories::{AlertRepository, EventLog, ProviderRepository};
use crate::rotation::RotationScheduler;
use crate::sync::SyncQueueManager;
use crate::telemetry::trace_id_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub health: StoreHealth,
    pub rotation: Arc<RotationScheduler>,
    pub queue: Arc<SyncQueueManager>,
    pub analytics: Arc<AnalyticsCacheManager>,
    pub providers: ProviderRepository,
    pub events: EventLog,
    pub alerts: AlertRepository,
}

impl AppState {
    /// Wires every component against one pool.
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        source: Arc<dyn MetricSource>,
        health: StoreHealth,
    ) -> Self {
        let analytics = Arc::new(AnalyticsCacheManager::new(
            db.clone(),
            source,
            config.analytics.clone(),
        ));
        Self {
            rotation: Arc::new(RotationScheduler::new(db.clone(), config.rotation.clone())),
            queue: Arc::new(SyncQueueManager::new(db.clone(), &config, analytics.clone())),
            analytics,
            providers: ProviderRepository::new(db.clone()),
            events: EventLog::new(db.clone()),
            alerts: AlertRepository::new(db.clone()),
            health,
            config,
            db,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let users = Router::new()
        .route(
            "/rotation",
            get(handlers::rotation::get_rotation).put(handlers::rotation::configure_rotation),
        )
        .route("/rotation/next", post(handlers::rotation::advance_rotation))
        .route("/rotation/previous", post(handlers::rotation::previous_source))
        .route("/rotation/toggle", post(handlers::rotation::toggle_rotation))
        .route("/rotation/speed", put(handlers::rotation::set_rotation_speed))
        .route("/sync", post(handlers::sync::enqueue_sync))
        .route("/sync/summary", get(handlers::sync::get_sync_summary))
        .route("/sync/jobs", get(handlers::sync::list_jobs))
        .route(
            "/analytics/refresh",
            post(handlers::analytics::refresh_analytics),
        )
        .route("/events", get(handlers::events::list_events))
        .route("/alerts", get(handlers::alerts::list_alerts))
        .route(
            "/alerts/{alert_id}/ack",
            post(handlers::alerts::acknowledge_alert),
        )
        .route("/providers", get(handlers::providers::list_providers))
        .route(
            "/providers/{slug}/connect",
            post(handlers::providers::connect_provider),
        )
        .route(
            "/providers/{slug}/disconnect",
            post(handlers::providers::disconnect_provider),
        );

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest("/users/{user_id}", users)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until `shutdown` fires.
pub async fn run_server(
    config: &AppConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::rotation::get_rotation,
        crate::handlers::rotation::configure_rotation,
        crate::handlers::rotation::advance_rotation,
        crate::handlers::rotation::previous_source,
        crate::handlers::rotation::toggle_rotation,
        crate::handlers::rotation::set_rotation_speed,
        crate::handlers::sync::enqueue_sync,
        crate::handlers::sync::get_sync_summary,
        crate::handlers::sync::list_jobs,
        crate::handlers::analytics::refresh_analytics,
        crate::handlers::events::list_events,
        crate::handlers::alerts::list_alerts,
        crate::handlers::alerts::acknowledge_alert,
        crate::handlers::providers::list_providers,
        crate::handlers::providers::connect_provider,
        crate::handlers::providers::disconnect_provider,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::HealthResponse,
            crate::handlers::rotation::RotationResponse,
            crate::handlers::rotation::ConfigureRotationRequest,
            crate::handlers::rotation::RotationSpeedRequest,
            crate::rotation::RotationSnapshot,
            crate::rotation::RotationPhase,
            crate::sync::EnqueueRequest,
            crate::sync::EnqueueResult,
            crate::sync::ProviderQueueSummary,
            crate::sync::SyncJobView,
            crate::handlers::sync::QueueSummaryResponse,
            crate::handlers::sync::JobsResponse,
            crate::analytics::Period,
            crate::analytics::SummaryStats,
            crate::analytics::AnalyticsSnapshot,
            crate::analytics::RefreshReport,
            crate::handlers::analytics::RefreshAnalyticsRequest,
            crate::handlers::events::EventView,
            crate::handlers::events::EventsResponse,
            crate::handlers::alerts::AlertView,
            crate::handlers::alerts::AlertsResponse,
            crate::handlers::providers::ProviderView,
            crate::handlers::providers::ProvidersResponse,
            crate::handlers::providers::ConnectProviderRequest,
            crate::handlers::providers::DisconnectResponse,
        )
    ),
    tags(
        (name = "rotation", description = "Display rotation across providers"),
        (name = "sync", description = "Per-provider sync queue"),
        (name = "analytics", description = "Cached summary statistics"),
        (name = "events", description = "Connection event log"),
        (name = "alerts", description = "Sync failure alerts"),
        (name = "providers", description = "Provider connection hooks"),
    ),
    info(
        title = "Rotation Sync API",
        description = "Display rotation and provider sync scheduling",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
