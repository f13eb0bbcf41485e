use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use tethercap_core::FrameParams;
use tethercap_infra::JobController;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(camera_status))
        .route("/capture", post(capture))
}

pub async fn camera_status(
    Extension(controller): Extension<Arc<JobController>>,
) -> axum::response::Response {
    (StatusCode::OK, Json(controller.camera_status())).into_response()
}

/// Ad hoc capture. A missing or unreadable body captures with defaults.
pub async fn capture(
    Extension(controller): Extension<Arc<JobController>>,
    body: Option<Json<dto::CaptureRequest>>,
) -> axum::response::Response {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let params = FrameParams::ad_hoc(
        request.base_name.as_deref(),
        request.exposure_time,
        request.iso,
        Utc::now(),
    );

    match controller.capture_now(params).await {
        Ok(frame) => (StatusCode::OK, Json(frame)).into_response(),
        Err(e) => errors::camera_error_to_response(e),
    }
}
