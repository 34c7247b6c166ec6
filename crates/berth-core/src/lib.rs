//! berth-core: shared types for the berth allocation engine.
//!
//! Holds the persisted record shapes (`Resource`, `Lease`, `LogEntry`),
//! their status machines, custom attribute requirement matching, and the
//! `berth.toml` configuration model.

pub mod attributes;
pub mod config;
pub mod duration;
pub mod status;
pub mod types;

pub use config::BerthConfig;
pub use status::{LeaseStatus, ResourceStatus};
pub use types::*;
