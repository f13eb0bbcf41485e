//! Capture job system.
//!
//! ## Components
//!
//! - `JobStore`: authoritative registry of job records, atomic updates and a
//!   status channel per job
//! - `JobRunner`: one task per job, advancing it frame by frame through the
//!   capture gateway
//! - `JobController`: start/status/pause/resume/cancel entry point, and
//!   batches that run one job after another

pub mod controller;
pub mod runner;
pub mod store;

pub use controller::{JobController, SHUTDOWN_GRACE};
pub use runner::{JobRunner, RunnerExit};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
