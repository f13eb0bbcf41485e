//! Infrastructure layer: camera access, job storage, runners and config.

pub mod camera;
pub mod config;
pub mod gateway;
pub mod jobs;
pub mod session;

#[cfg(test)]
mod testing;

pub use camera::{Camera, CameraError, SimulatedCamera};
pub use config::JobsConfig;
pub use gateway::CaptureGateway;
pub use jobs::{InMemoryJobStore, JobController, JobStore};
pub use session::{InMemorySessionSink, SessionSink};
