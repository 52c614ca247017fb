//! Fleetrun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Transports (SSH, eAPI, TCP, ...)
//! - Runtime specifics
//!
//! All types here represent the core business domain of Fleetrun:
//! endpoints, per-endpoint task state, error classification, and the
//! batch report produced by one fan-out run.

pub mod endpoint;
pub mod error;
pub mod ids;
pub mod report;
pub mod state;

// Re-export commonly used types
pub use endpoint::{CommandOutcome, Endpoint};
pub use error::{BatchError, ErrorKind};
pub use ids::{BatchId, EndpointId};
pub use report::{BatchReport, TaskFailure, TaskOutcome};
pub use state::TaskState;
