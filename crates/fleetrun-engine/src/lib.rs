//! Fleetrun Execution Engine
//!
//! Given N endpoints, run each endpoint's command sequence through an
//! externally supplied session capability with bounded parallelism,
//! per-attempt timeout, classified retry, cooperative cancellation,
//! and exact success/failure aggregation.
//!
//! The engine owns scheduling and bookkeeping only. Transports (SSH,
//! eAPI, TCP probes, ...) implement [`SessionFactory`] and [`Session`];
//! report rendering belongs to the caller.

pub mod aggregator;
pub mod config;
pub mod scheduler;
pub mod session;
mod task;

pub use aggregator::BatchAggregator;
pub use config::RunConfig;
pub use scheduler::{Scheduler, SchedulerError};
pub use session::{Session, SessionFactory};
