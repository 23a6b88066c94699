//! # Rotation Sync Entry Point
//!
//! `serve` runs the API together with the rotation driver, sync worker and
//! background refresh; `migrate` applies pending migrations and exits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use rotation_sync::{
    adapters::{AdapterRegistry, DemoAdapter},
    analytics::EmptyMetricSource,
    config::ConfigLoader,
    db::{StoreHealth, init_pool},
    repositories::ScheduleRepository,
    rotation::RotationDriver,
    server::{AppState, run_server},
    sync::{BackgroundRefresh, SyncWorker},
    telemetry::init_tracing,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rotation-sync", version, about = "Provider rotation and sync service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API and background loops (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    init_tracing(&config).context("failed to initialise tracing")?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    Migrator::up(&db, None)
        .await
        .context("failed to apply migrations")?;

    if let Some(Command::Migrate) = cli.command {
        info!("Migrations applied");
        return Ok(());
    }

    let config = Arc::new(config);
    let db = Arc::new(db);
    let health = StoreHealth::new();
    let state = AppState::new(
        config.clone(),
        db.clone(),
        Arc::new(EmptyMetricSource),
        health.clone(),
    );

    let registry =
        Arc::new(AdapterRegistry::new().with_fallback(Arc::new(DemoAdapter::default())));

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    let driver = RotationDriver::new(
        state.rotation.clone(),
        health.clone(),
        Duration::from_millis(config.rotation.driver_tick_ms),
    );
    tasks.push(tokio::spawn(driver.run(shutdown.clone())));

    let worker = SyncWorker::new(
        state.queue.clone(),
        registry,
        health.clone(),
        config.worker.clone(),
    );
    tasks.push(tokio::spawn(worker.run(shutdown.clone())));

    let refresh = BackgroundRefresh::new(
        state.queue.clone(),
        ScheduleRepository::new(db.clone()),
        health.clone(),
        config.worker.clone(),
    );
    tasks.push(tokio::spawn(refresh.run(shutdown.clone())));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let served = run_server(&config, state, shutdown.clone()).await;
    shutdown.cancel();

    for task in tasks {
        if let Err(err) = task.await {
            error!(error = %err, "background task panicked");
        }
    }

    served
}
