use serde::{Deserialize, Serialize};

use tethercap_core::{CalibrationPreset, JobId, JobSnapshot};

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /camera/capture`; every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct CaptureRequest {
    pub base_name: Option<String>,
    pub exposure_time: Option<String>,
    pub iso: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct StartJobResponse {
    pub job_id: JobId,
}

/// Jobs of a batch, in run order.
#[derive(Debug, Serialize)]
pub struct StartBatchResponse {
    pub job_ids: Vec<JobId>,
}

#[derive(Debug, Serialize)]
pub struct PresetsResponse {
    pub presets: Vec<CalibrationPreset>,
}

/// Acknowledgement of a command, with the job as it stands afterwards.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobSnapshot>,
}

impl CommandResponse {
    pub fn ok(job: Option<JobSnapshot>) -> Self {
        Self { ok: true, job }
    }
}
