//! Client side of the capture job API.
//!
//! - `http`: typed HTTP client for every job and camera endpoint
//! - `reconciler`: keeps a local copy of one job's status by polling

pub mod http;
pub mod reconciler;

pub use http::{ClientError, JobsClient};
pub use reconciler::{PollConfig, PollReconciler, ReconcilerState, StatusSource};
