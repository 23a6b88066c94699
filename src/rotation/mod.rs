//! # Display Rotation
//!
//! Cycles a user's on-screen attention across their providers. The scheduler
//! owns the persisted state; the driver is the timer that ticks it.

pub mod driver;
pub mod scheduler;
pub mod state;

pub use driver::RotationDriver;
pub use scheduler::RotationScheduler;
pub use state::{MAX_INTERVAL_SECONDS, RotationPhase, RotationSnapshot};
