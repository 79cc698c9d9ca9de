//! Rate limiting middleware.
//!
//! Sliding one-minute window per client id: timestamps older than 60 s
//! are pruned on every check, and a client over its budget gets a 429
//! envelope with a retry hint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use tracing::warn;

const WINDOW: Duration = Duration::from_secs(60);
const RETRY_AFTER_SECS: u64 = 60;

/// Per-client sliding-window limiter.
#[derive(Clone)]
pub struct RateLimiter {
    requests_per_minute: u32,
    state: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
}

/// Outcome of a limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Allowed,
    Exceeded,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check one request from a client. Prunes the client's window
    /// before counting.
    pub fn check(&self, client_id: &str) -> RateLimitOutcome {
        let now = Instant::now();
        let mut state = self.state.lock();
        let window = state.entry(client_id.to_string()).or_default();
        window.retain(|t| now.duration_since(*t) < WINDOW);

        if window.len() >= self.requests_per_minute as usize {
            RateLimitOutcome::Exceeded
        } else {
            window.push(now);
            RateLimitOutcome::Allowed
        }
    }

    /// Drop clients whose whole window has aged out. Run from a
    /// background task so the map does not grow unboundedly.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.retain(|_, window| {
            window.retain(|t| now.duration_since(*t) < WINDOW);
            !window.is_empty()
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.state.lock().len()
    }
}

/// Axum middleware enforcing the limiter per client IP.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    axum::extract::State(limiter): axum::extract::State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_id = addr.ip().to_string();

    match limiter.check(&client_id) {
        RateLimitOutcome::Allowed => next.run(request).await,
        RateLimitOutcome::Exceeded => {
            warn!(client = %client_id, "rate limit exceeded");

            let body = serde_json::json!({
                "error": "RATE_LIMIT_EXCEEDED",
                "detail": "Too many requests, retry after 60 seconds",
                "request_id": serde_json::Value::Null,
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", RETRY_AFTER_SECS.to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}
