//! Job error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::JobId;
use crate::job::JobStatus;

/// Result type used by job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Operator command applied to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    /// Runner claiming a pending job.
    Start,
    Pause,
    Resume,
    Cancel,
    Purge,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Start => "start",
            JobAction::Pause => "pause",
            JobAction::Resume => "resume",
            JobAction::Cancel => "cancel",
            JobAction::Purge => "purge",
        }
    }
}

impl core::fmt::Display for JobAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing job error.
///
/// Frame-level camera failures are not part of this enum: they are recorded
/// on the job record and never surface as an operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Malformed start parameters (caller error, not retried).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown job id.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The command is not valid in the job's current state.
    #[error("cannot {action} job {job_id} while {from}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        action: JobAction,
    },

    /// The job store itself failed.
    #[error("job store error: {0}")]
    Store(String),
}

impl JobError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn invalid_transition(job_id: JobId, from: JobStatus, action: JobAction) -> Self {
        Self::InvalidTransition {
            job_id,
            from,
            action,
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
