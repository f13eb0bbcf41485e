use axum::Router;

pub mod camera;
pub mod jobs;
pub mod system;

/// Router for all job and camera endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/camera", camera::router())
}
