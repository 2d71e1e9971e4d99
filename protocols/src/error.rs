//! Fixed error envelopes returned to the caller.
//!
//! Every caller-visible failure uses the same two-field shape regardless of
//! cause: `{"error":{"message":..., "type":...}}`. Kept deliberately narrower
//! than a general-purpose error response type since the proxy's contract
//! names exact strings (see component 1 of the design).

use serde::Serialize;

#[cfg(feature = "axum")]
use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorEnvelope {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: "invalid_request_error".to_string(),
            },
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: "internal_error".to_string(),
            },
        }
    }
}

#[cfg(feature = "axum")]
pub fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorEnvelope::invalid_request(message)),
    )
        .into_response()
}

#[cfg(feature = "axum")]
pub fn internal_error(message: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorEnvelope::internal(message)),
    )
        .into_response()
}
