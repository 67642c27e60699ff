//! Errors returned by the control endpoint.

// Rust guideline compliant 2026-02

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// A control request that was refused. No state changes when one is returned.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Missing, malformed or unusable input.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The shared secret is configured and the request did not carry it.
    #[error("Missing or invalid control secret")]
    Unauthorized,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ControlError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ControlError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for control handlers.
pub type Result<T> = std::result::Result<T, ControlError>;
