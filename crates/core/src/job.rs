//! Capture job record and its state machine.
//!
//! A [`Job`] is one requested sequence of frames. All state transitions go
//! through the methods on `Job`; the store applies them under its lock so a
//! reader never observes a partially-updated record.
//!
//! ```text
//! pending -> running -> (paused <-> running)* -> completed | cancelled | error
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JobAction, JobError, JobResult};
use crate::id::{JobId, SessionId};

/// Shortest shutter speed used for bias frames.
pub const BIAS_EXPOSURE: &str = "1/4000";

/// Kind of capture sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Single,
    Bulk,
    CalibrationDark,
    CalibrationBias,
    CalibrationFlat,
    CalibrationFlatDark,
    SessionCapture,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Single => "single",
            JobKind::Bulk => "bulk",
            JobKind::CalibrationDark => "calibration-dark",
            JobKind::CalibrationBias => "calibration-bias",
            JobKind::CalibrationFlat => "calibration-flat",
            JobKind::CalibrationFlatDark => "calibration-flat-dark",
            JobKind::SessionCapture => "session-capture",
        }
    }

    /// Calibration frame type tag (`dark`, `bias`, `flat`, `flat_dark`).
    pub fn calibration_frame_type(&self) -> Option<&'static str> {
        match self {
            JobKind::CalibrationDark => Some("dark"),
            JobKind::CalibrationBias => Some("bias"),
            JobKind::CalibrationFlat => Some("flat"),
            JobKind::CalibrationFlatDark => Some("flat_dark"),
            _ => None,
        }
    }

    pub fn is_calibration(&self) -> bool {
        self.calibration_frame_type().is_some()
    }
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, runner not yet started
    Pending,
    /// Runner is advancing the sequence
    Running,
    /// Held at a frame boundary by the operator
    Paused,
    /// Frame budget exhausted
    Completed,
    /// Stopped by the operator
    Cancelled,
    /// Stopped by a resource fault
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Error
        )
    }

    /// Running or paused: the states that accept operator commands.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Error => "error",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific parameters supplied at start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    /// Shutter speed as the camera spells it (`30`, `1/60`, `2"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<String>,
    /// Target ADU level for flats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_adu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
    /// Wait before the first frame.
    #[serde(default)]
    pub delay_before_start_seconds: f64,
}

/// Parameters handed to the camera for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameParams {
    /// 1-based position of the frame within its job.
    pub sequence: u32,
    pub image_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_adu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<String>,
}

impl FrameParams {
    /// Parameters for an ad hoc capture outside any job.
    pub fn ad_hoc(base_name: Option<&str>, exposure_time: Option<String>, iso: Option<String>, now: DateTime<Utc>) -> Self {
        let stamp = now.format("%Y%m%d_%H%M%S");
        let image_name = match base_name {
            Some(base) => format!("{}_{}", base, stamp),
            None => format!("capture_{}", stamp),
        };
        Self {
            sequence: 1,
            image_name,
            exposure_time,
            target_adu: None,
            iso,
            frame_type: None,
        }
    }
}

/// A capture job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Requested frame count
    pub total: u32,
    /// Frames that produced a file
    pub completed: u32,
    /// Frames that ended in a per-frame error
    pub failed: u32,
    pub interval_seconds: f64,
    #[serde(default)]
    pub kind_params: KindParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_capture_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    /// Produced filenames in capture order; append-only
    pub output_files: Vec<String>,
}

impl Job {
    /// Create a pending job.
    pub fn new(
        kind: JobKind,
        total: u32,
        interval_seconds: f64,
        kind_params: KindParams,
        target_session_id: Option<SessionId>,
    ) -> Self {
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Pending,
            total,
            completed: 0,
            failed: 0,
            interval_seconds,
            kind_params,
            target_session_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_capture_at: None,
            last_error_message: None,
            output_files: Vec::new(),
        }
    }

    /// Frames attempted so far (successful or failed).
    pub fn attempted(&self) -> u32 {
        self.completed + self.failed
    }

    /// Frames not yet attempted.
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.attempted())
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempted() >= self.total
    }

    /// Runner claims the job: pending -> running.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> JobResult<()> {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Running;
                self.started_at.get_or_insert(now);
                Ok(())
            }
            from => Err(JobError::invalid_transition(self.id, from, JobAction::Start)),
        }
    }

    /// running -> paused.
    pub fn pause(&mut self) -> JobResult<()> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Paused;
                Ok(())
            }
            from => Err(JobError::invalid_transition(self.id, from, JobAction::Pause)),
        }
    }

    /// paused -> running.
    pub fn resume(&mut self) -> JobResult<()> {
        match self.status {
            JobStatus::Paused => {
                self.status = JobStatus::Running;
                Ok(())
            }
            from => Err(JobError::invalid_transition(self.id, from, JobAction::Resume)),
        }
    }

    /// running | paused -> cancelled.
    ///
    /// Returns `Ok(false)` when the job was already cancelled; that retry is a
    /// no-op and keeps the original `completed_at`.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> JobResult<bool> {
        match self.status {
            JobStatus::Running | JobStatus::Paused => {
                self.status = JobStatus::Cancelled;
                self.completed_at = Some(now);
                Ok(true)
            }
            JobStatus::Cancelled => Ok(false),
            from => Err(JobError::invalid_transition(self.id, from, JobAction::Cancel)),
        }
    }

    /// Record a frame that produced `filename`.
    ///
    /// Frames that finish after a cancel are still counted; only the status
    /// of an active job can move to completed here. Returns `false` if the
    /// frame budget was already exhausted and nothing was recorded.
    pub fn record_success(&mut self, filename: String, now: DateTime<Utc>) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.completed += 1;
        self.output_files.push(filename);
        self.last_capture_at = Some(now);
        self.complete_if_exhausted(now);
        true
    }

    /// Record a per-frame failure; the job continues.
    pub fn record_failure(&mut self, message: String, now: DateTime<Utc>) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.failed += 1;
        self.last_error_message = Some(message);
        self.complete_if_exhausted(now);
        true
    }

    /// Record a resource fault: an active job moves to error.
    ///
    /// The faulted frame is neither completed nor failed.
    pub fn record_fault(&mut self, message: String, now: DateTime<Utc>) {
        self.last_error_message = Some(message);
        if !self.status.is_terminal() {
            self.status = JobStatus::Error;
            self.completed_at = Some(now);
        }
    }

    fn complete_if_exhausted(&mut self, now: DateTime<Utc>) {
        if self.is_exhausted() && self.status.is_active() {
            self.status = JobStatus::Completed;
            self.completed_at = Some(now);
        }
    }

    /// Camera parameters for the next frame.
    pub fn next_frame_params(&self, now: DateTime<Utc>) -> FrameParams {
        let sequence = self.attempted() + 1;
        let params = &self.kind_params;
        let stamp = now.format("%Y%m%d_%H%M%S");

        let exposure_time = match self.kind {
            JobKind::CalibrationBias => Some(BIAS_EXPOSURE.to_string()),
            _ => params.exposure_time.clone(),
        };
        let target_adu = match self.kind {
            JobKind::CalibrationFlat => params.target_adu,
            _ => None,
        };

        let image_name = match self.kind.calibration_frame_type() {
            Some(frame_type) => {
                let base = params
                    .base_name
                    .clone()
                    .unwrap_or_else(|| format!("{}_frame", frame_type));
                let mut parts = vec![base];
                if let Some(exposure) = &exposure_time {
                    parts.push(format!("exp{}", filename_safe_exposure(exposure)));
                }
                if let Some(iso) = &params.iso {
                    parts.push(format!("iso{}", iso));
                }
                parts.push(stamp.to_string());
                parts.push(format!("f{:03}", sequence));
                parts.join("_")
            }
            None => match self.kind {
                JobKind::Single => match &params.base_name {
                    Some(base) => format!("{}_{}", base, stamp),
                    None => format!("capture_{}", stamp),
                },
                _ => {
                    let base = params
                        .base_name
                        .clone()
                        .or_else(|| self.target_session_id.as_ref().map(|s| s.to_string()))
                        .unwrap_or_else(|| "bulk".to_string());
                    format!("{}_{:03}_{}", base, sequence, stamp)
                }
            },
        };

        FrameParams {
            sequence,
            image_name,
            exposure_time,
            target_adu,
            iso: params.iso.clone(),
            frame_type: self.kind.calibration_frame_type().map(str::to_string),
        }
    }

    /// Read-only copy with display-only estimates computed at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> JobSnapshot {
        let remaining = self.remaining();
        let eta = if self.status.is_terminal() {
            None
        } else {
            let millis = (remaining as f64 * self.interval_seconds * 1000.0).round() as i64;
            chrono::Duration::try_milliseconds(millis).and_then(|left| now.checked_add_signed(left))
        };
        let progress_percent = if self.total == 0 {
            0.0
        } else {
            (self.attempted() as f64 / self.total as f64) * 100.0
        };

        JobSnapshot {
            job: self.clone(),
            remaining,
            progress_percent,
            eta,
        }
    }
}

/// `1/60` -> `1-60`, `2"` -> `2s`.
fn filename_safe_exposure(exposure: &str) -> String {
    exposure.replace('/', "-").replace('"', "s")
}

/// Point-in-time copy of a job as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub job: Job,
    /// Frames not yet attempted
    pub remaining: u32,
    pub progress_percent: f64,
    /// Best-effort completion estimate; interval jitter and exposure time are
    /// not modelled.
    pub eta: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn id(&self) -> JobId {
        self.job.id
    }

    pub fn status(&self) -> JobStatus {
        self.job.status
    }

    pub fn is_terminal(&self) -> bool {
        self.job.status.is_terminal()
    }
}

/// All jobs known to the store, oldest first, with summary counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub jobs: Vec<JobSnapshot>,
    /// Jobs not yet terminal (pending, running or paused)
    pub active_count: usize,
    pub finished_count: usize,
    pub total_count: usize,
}

impl JobListing {
    pub fn from_snapshots(mut jobs: Vec<JobSnapshot>) -> Self {
        jobs.sort_by(|a, b| {
            a.job
                .created_at
                .cmp(&b.job.created_at)
                .then_with(|| a.id().cmp(&b.id()))
        });
        let finished_count = jobs.iter().filter(|s| s.is_terminal()).count();
        Self {
            active_count: jobs.len() - finished_count,
            finished_count,
            total_count: jobs.len(),
            jobs,
        }
    }
}
