//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use tethercap_infra::{JobController, SimulatedCamera};

use crate::config::ServerConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Job controller over the simulated camera and in-memory storage.
pub fn build_controller(config: &ServerConfig) -> Arc<JobController> {
    let camera = Arc::new(SimulatedCamera::new(config.jobs.simulated_capture));
    Arc::new(JobController::in_memory(camera, config.jobs.limits))
}

/// Router serving `controller`.
pub fn build_router(controller: Arc<JobController>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(controller))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::trace_requests)))
}
