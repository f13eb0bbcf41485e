//! `tethercap-core`: capture-job domain building blocks.
//!
//! This crate contains **pure domain** types (no I/O, no runtime): job
//! identifiers, the job record and its state machine, request validation and
//! the error taxonomy shared by the server and the client.

pub mod capture;
pub mod error;
pub mod id;
pub mod job;
pub mod preset;
pub mod request;

pub use capture::{CameraStatus, CapturedFrame};
pub use error::{JobAction, JobError, JobResult};
pub use id::{JobId, SessionId};
pub use job::{FrameParams, Job, JobKind, JobListing, JobSnapshot, JobStatus, KindParams};
pub use preset::{CalibrationPreset, calibration_presets};
pub use request::{StartJobRequest, ValidationLimits};
