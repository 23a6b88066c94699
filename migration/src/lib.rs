//! Database migrations for the rotation and sync engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_providers;
mod m2025_01_10_000002_create_rotation_state;
mod m2025_01_10_000003_create_sync_queue;
mod m2025_01_10_000004_create_rotation_schedule;
mod m2025_01_10_000005_create_connection_events;
mod m2025_01_10_000006_create_analytics_cache;
mod m2025_01_10_000007_create_sync_alerts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_providers::Migration),
            Box::new(m2025_01_10_000002_create_rotation_state::Migration),
            Box::new(m2025_01_10_000003_create_sync_queue::Migration),
            Box::new(m2025_01_10_000004_create_rotation_schedule::Migration),
            Box::new(m2025_01_10_000005_create_connection_events::Migration),
            Box::new(m2025_01_10_000006_create_analytics_cache::Migration),
            Box::new(m2025_01_10_000007_create_sync_alerts::Migration),
        ]
    }
}
