//! Wire types for the OpenAI-compatible chat-completion proxy.
//!
//! `chat` defines the caller-facing request/response/streaming-chunk shapes;
//! `validated` wires request decoding and validation into an axum extractor;
//! `error` renders the fixed error envelopes the proxy promises callers.

pub mod chat;
pub mod error;
pub mod validated;

pub use chat::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, ChunkDelta, FunctionCall, FunctionDef, FunctionTool, McpAllowedTools,
    McpToolSpec, MessageContent, RequestTool, Role, StreamOptions, ToolCall, UrlContextSpec,
    Usage,
};
pub use validated::{Normalizable, ValidatedJson};
