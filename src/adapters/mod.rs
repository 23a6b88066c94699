//! Provider adapters
//!
//! - [`ProviderAdapter`]: the interface every external provider integration implements
//! - [`AdapterRegistry`]: slug-keyed lookup with an optional fallback
//! - [`DemoAdapter`]: simulated provider for local runs

pub mod demo;
pub mod registry;
pub mod trait_;

pub use demo::DemoAdapter;
pub use registry::{AdapterRegistry, RegistryError};
pub use trait_::{ProviderAdapter, SyncContext, SyncError, SyncErrorKind, SyncOutcome};
