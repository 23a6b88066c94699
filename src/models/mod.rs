//! # Data Models
//!
//! SeaORM entities for every table the engine owns.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod analytics_cache;
pub mod connection_event;
pub mod provider;
pub mod rotation_schedule;
pub mod rotation_state;
pub mod sync_alert;
pub mod sync_job;

pub use analytics_cache::Entity as AnalyticsCache;
pub use connection_event::Entity as ConnectionEvent;
pub use provider::Entity as Provider;
pub use rotation_schedule::Entity as RotationSchedule;
pub use rotation_state::Entity as RotationState;
pub use sync_alert::Entity as SyncAlert;
pub use sync_job::Entity as SyncJob;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "rotation-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
