//! MCP error types.
//!
//! Distinguishes protocol-level failures (propagated to the caller as an
//! abort) from tool-level failures (surfaced into the conversation so the
//! model can react, per the error-handling design).

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP init failed for {server_url}: {message}")]
    InitFailed { server_url: String, message: String },

    #[error("Session expired, please retry the request")]
    SessionExpired,

    #[error("Authentication error: {hostname}")]
    AuthFailed { hostname: String },

    #[error("MCP call to {server_url} failed ({status}): {body}")]
    CallFailed {
        server_url: String,
        status: u16,
        body: String,
    },

    #[error("MCP server returned a JSON-RPC error: {0}")]
    JsonRpc(String),

    #[error("invalid response from MCP server: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
