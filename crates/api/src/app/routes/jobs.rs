use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use tethercap_core::{StartJobRequest, calibration_presets};
use tethercap_infra::JobController;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(start_job).get(list_jobs))
        .route("/batch", post(start_batch))
        .route("/presets", get(list_presets))
        .route("/:id", get(get_job).delete(purge_job))
        .route("/:id/pause", post(pause_job))
        .route("/:id/resume", post(resume_job))
        .route("/:id/cancel", post(cancel_job))
}

pub async fn start_job(
    Extension(controller): Extension<Arc<JobController>>,
    body: Result<Json<StartJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                rejection.body_text(),
            );
        }
    };

    match controller.start(request).await {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(dto::StartJobResponse { job_id })).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

/// Start a list of jobs that run one after another.
pub async fn start_batch(
    Extension(controller): Extension<Arc<JobController>>,
    body: Result<Json<Vec<StartJobRequest>>, JsonRejection>,
) -> axum::response::Response {
    let Json(requests) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                rejection.body_text(),
            );
        }
    };

    match controller.start_batch(requests).await {
        Ok(job_ids) => {
            (StatusCode::ACCEPTED, Json(dto::StartBatchResponse { job_ids })).into_response()
        }
        Err(e) => errors::job_error_to_response(e),
    }
}

pub async fn list_presets() -> axum::response::Response {
    (
        StatusCode::OK,
        Json(dto::PresetsResponse {
            presets: calibration_presets(),
        }),
    )
        .into_response()
}

pub async fn list_jobs(
    Extension(controller): Extension<Arc<JobController>>,
) -> axum::response::Response {
    match controller.list() {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(controller): Extension<Arc<JobController>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match controller.status(job_id) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

pub async fn pause_job(
    Extension(controller): Extension<Arc<JobController>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match controller.pause(job_id) {
        Ok(snapshot) => (StatusCode::OK, Json(dto::CommandResponse::ok(Some(snapshot)))).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

pub async fn resume_job(
    Extension(controller): Extension<Arc<JobController>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match controller.resume(job_id) {
        Ok(snapshot) => (StatusCode::OK, Json(dto::CommandResponse::ok(Some(snapshot)))).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

pub async fn cancel_job(
    Extension(controller): Extension<Arc<JobController>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match controller.cancel(job_id) {
        Ok(snapshot) => (StatusCode::OK, Json(dto::CommandResponse::ok(Some(snapshot)))).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

pub async fn purge_job(
    Extension(controller): Extension<Arc<JobController>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match controller.purge(job_id) {
        Ok(()) => (StatusCode::OK, Json(dto::CommandResponse::ok(None))).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}
