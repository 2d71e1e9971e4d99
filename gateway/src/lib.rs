//! MCP completions gateway: a streaming chat-completion proxy that
//! federates external MCP tool servers into an OpenAI-compatible
//! `/chat/completions` request.
//!
//! - [`config`] — CLI/env surface over the environment-agnostic `ProxyConfig`.
//! - [`state`] — shared process state handed to every request.
//! - [`handler`] — HTTP entry point (C1 validation through C5 emission).
//! - [`orchestrator`] — the multi-round completion loop (C4).
//! - [`sink`] — the dual-mode streaming/buffering response sink.
//! - [`sse`] — upstream SSE chunk framing.
//! - [`tool_format`] — renders tool invocation/result blocks into the
//!   conversation.
//! - [`url_context`] — the `url_context` tool collaborator.
//! - [`emitter`] — builds the final response for both modes.
//! - [`error`] — request-aborting error type.

pub mod config;
pub mod emitter;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod sink;
pub mod sse;
pub mod state;
pub mod tool_format;
pub mod url_context;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Timeout applied to every request, including the upstream LLM round-trip.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Builds the axum router: the single completion route (served at any
/// path, matching the teacher's "drop-in base URL replacement" posture)
/// plus `/healthz`, wrapped in the trace and timeout layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handler::healthz))
        .route("/{*path}", post(handler::chat_completions))
        .route("/", post(handler::chat_completions))
        .layer(TimeoutLayer::new(UPSTREAM_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
