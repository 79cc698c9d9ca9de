//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, and latency.
//! Health probes and metrics scrapes are skipped to reduce noise.

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == "/api/v1/health" || path == "/api/v1/ready" || path == "/metrics" {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(
            method = %method,
            path = %path,
            status,
            latency_ms = latency.as_millis() as u64,
            "request failed"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status,
            latency_ms = latency.as_millis() as u64,
            "request completed"
        );
    }

    response
}
