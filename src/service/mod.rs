//! Service layer
//!
//! The facade that orchestrates the registry, relays, snapshot cache, and
//! status tracking, plus its configuration and event types.

pub mod config;
pub mod events;
pub mod facade;
pub mod snapshot;

pub use config::ServiceConfig;
pub use events::ServiceEvent;
pub use facade::CameraService;
pub use snapshot::SnapshotCache;
