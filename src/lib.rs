//! # Rotation Sync Library
//!
//! Display rotation across connected data providers plus the per-provider
//! sync queue, analytics cache, connection event log and alerting that feed it.

pub mod adapters;
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod rotation;
pub mod server;
pub mod sync;
pub mod telemetry;
pub use migration;
