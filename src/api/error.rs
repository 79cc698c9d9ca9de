//! API error envelope.
//!
//! Every failing operation returns `{error, detail, request_id}` with
//! an HTTP status reflecting the class. Unexpected errors are logged
//! with their cause; the envelope never leaks internals.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub detail: String,
    pub request_id: Option<String>,
}

/// An error ready to be rendered as an envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub detail: String,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn validation(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR",
            detail: detail.into(),
            request_id: None,
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            detail: detail.into(),
            request_id: None,
        }
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "NOT_READY",
            detail: detail.into(),
            request_id: None,
        }
    }

    /// Log the cause, return a generic envelope.
    pub fn internal(err: anyhow::Error) -> Self {
        error!(?err, "unexpected error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_SERVER_ERROR",
            detail: "An unexpected error occurred".to_string(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            error: self.code.to_string(),
            detail: self.detail,
            request_id: self.request_id,
        };
        (self.status, Json(envelope)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err)
    }
}
