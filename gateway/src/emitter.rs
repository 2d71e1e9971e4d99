//! Response Emitter (C5): builds the non-streaming JSON object from a
//! drained [`BufferingSink`], and the SSE response headers for the
//! streaming path. Chunk construction for the streaming path itself lives
//! in [`crate::sink::ForwardingSink`], since each chunk needs the same
//! `id`/`created`/`model` bound once per request.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use openai_protocol::chat::{ChatCompletionResponse, ChatMessage, Choice, MessageContent, Role};

use crate::sink::BufferingSink;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn non_streaming_response(model: &str, sink: BufferingSink) -> Response {
    let created = unix_now();
    let response = ChatCompletionResponse {
        id: format!("chatcmpl-{created}"),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: Role::Assistant,
                content: if sink.content.is_empty() {
                    None
                } else {
                    Some(MessageContent::Text(sink.content))
                },
                tool_calls: None,
                tool_call_id: None,
                name: None,
                reasoning_content: if sink.reasoning.is_empty() {
                    None
                } else {
                    Some(sink.reasoning)
                },
            },
            finish_reason: "stop".to_string(),
        }],
        usage: Some(sink.usage),
    };
    axum::Json(response).into_response()
}

/// Wraps an SSE body stream with the response headers §4.5 promises.
pub fn streaming_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .expect("static headers and a streaming body always build a valid response")
}
