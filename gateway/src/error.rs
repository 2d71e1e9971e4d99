//! Errors that abort a request outright.
//!
//! Tool-level and per-server MCP failures are *not* represented here — those
//! are surfaced into the working conversation by the orchestrator instead
//! (see the error-handling table in the design docs). This enum only covers
//! the protocol-level failures that end the request.

use axum::response::{IntoResponse, Response};
use openai_protocol::error::internal_error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("upstream LLM endpoint {endpoint} returned {status}: {body}")]
    UpstreamNon2xx {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("upstream stream error: {0}")]
    StreamError(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // The caller-visible envelope is a fixed string regardless of cause;
        // the real error is only logged, never leaked onto the wire.
        tracing::error!(error = %self, "request aborted");
        internal_error("Internal server error")
    }
}
