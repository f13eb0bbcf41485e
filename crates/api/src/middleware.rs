use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};

/// Log one line per request with its outcome and latency.
pub async fn trace_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::warn!(method = %method, path = %path, status = status.as_u16(), elapsed_ms, "request failed");
    } else {
        tracing::info!(method = %method, path = %path, status = status.as_u16(), elapsed_ms, "request handled");
    }
    response
}
