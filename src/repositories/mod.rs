//! # Repository Layer
//!
//! Thin SeaORM wrappers over the provider, event, alert and schedule tables.

pub mod connection_event;
pub mod provider;
pub mod rotation_schedule;
pub mod sync_alert;

pub use connection_event::{EventLog, NewEvent};
pub use provider::ProviderRepository;
pub use rotation_schedule::ScheduleRepository;
pub use sync_alert::AlertRepository;
