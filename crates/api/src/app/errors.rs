use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tethercap_core::{JobError, JobId};
use tethercap_infra::CameraError;

pub fn job_error_to_response(err: JobError) -> axum::response::Response {
    match &err {
        JobError::InvalidRequest(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
        }
        JobError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        JobError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", err.to_string())
        }
        JobError::Store(_) => {
            tracing::error!(error = %err, "job store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
        }
    }
}

pub fn camera_error_to_response(err: CameraError) -> axum::response::Response {
    if err.is_resource_fault() {
        json_error(StatusCode::SERVICE_UNAVAILABLE, "camera_unavailable", err.to_string())
    } else {
        json_error(StatusCode::BAD_GATEWAY, "capture_failed", err.to_string())
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_job_id(s: &str) -> Result<JobId, axum::response::Response> {
    s.parse().map_err(job_error_to_response)
}
