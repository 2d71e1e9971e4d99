//! Dual-mode response sink (Design Note §9): the orchestrator always runs
//! the same streaming pipeline and pushes pieces through one of two sinks,
//! chosen once up front from the caller's original `stream` flag.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Bytes;
use openai_protocol::chat::{ChatCompletionChunk, ChunkChoice, ChunkDelta, Role, Usage};
use tokio::sync::mpsc;

#[async_trait]
pub trait ChunkSink: Send {
    async fn role_announcement(&mut self);
    async fn content_delta(&mut self, text: &str);
    async fn refusal_delta(&mut self, text: &str);
    async fn reasoning_delta(&mut self, text: &str);
    /// Terminal call. `finish_reason` is always rendered as `"stop"` on the
    /// wire regardless of which round ended the loop, matching the merged
    /// multi-round response the caller expects from a single completion.
    async fn finish(&mut self, usage: Usage, include_usage: bool);
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Streams each piece to the caller immediately as an SSE chunk.
pub struct ForwardingSink {
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
    id: String,
    created: u64,
    model: String,
}

impl ForwardingSink {
    pub fn new(tx: mpsc::Sender<Result<Bytes, std::io::Error>>, model: String) -> Self {
        let created = unix_now();
        Self {
            tx,
            id: format!("chatcmpl-{created}"),
            created,
            model,
        }
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }

    async fn send_chunk(&self, chunk: &ChatCompletionChunk) {
        let line = format!("data: {}\n\n", serde_json::to_string(chunk).unwrap_or_default());
        let _ = self.tx.send(Ok(Bytes::from(line))).await;
    }
}

#[async_trait]
impl ChunkSink for ForwardingSink {
    async fn role_announcement(&mut self) {
        let chunk = self.chunk(
            ChunkDelta {
                role: Some(Role::Assistant),
                ..Default::default()
            },
            None,
        );
        self.send_chunk(&chunk).await;
    }

    async fn content_delta(&mut self, text: &str) {
        let chunk = self.chunk(
            ChunkDelta {
                content: Some(text.to_string()),
                ..Default::default()
            },
            None,
        );
        self.send_chunk(&chunk).await;
    }

    async fn refusal_delta(&mut self, text: &str) {
        let chunk = self.chunk(
            ChunkDelta {
                refusal: Some(text.to_string()),
                ..Default::default()
            },
            None,
        );
        self.send_chunk(&chunk).await;
    }

    async fn reasoning_delta(&mut self, text: &str) {
        let chunk = self.chunk(
            ChunkDelta {
                reasoning_content: Some(text.to_string()),
                ..Default::default()
            },
            None,
        );
        self.send_chunk(&chunk).await;
    }

    async fn finish(&mut self, usage: Usage, include_usage: bool) {
        let mut chunk = self.chunk(ChunkDelta::default(), Some("stop".to_string()));
        if include_usage && usage.total_tokens > 0 {
            chunk.usage = Some(usage);
        }
        self.send_chunk(&chunk).await;
        let _ = self
            .tx
            .send(Ok(Bytes::from_static(b"data: [DONE]\n\n")))
            .await;
    }
}

/// Accumulates pieces into a single non-streaming response, run over the
/// exact same internal pipeline as [`ForwardingSink`].
#[derive(Debug, Default)]
pub struct BufferingSink {
    pub content: String,
    pub reasoning: String,
    pub refusal: String,
    pub usage: Usage,
}

#[async_trait]
impl ChunkSink for BufferingSink {
    async fn role_announcement(&mut self) {}

    async fn content_delta(&mut self, text: &str) {
        self.content.push_str(text);
    }

    async fn refusal_delta(&mut self, text: &str) {
        self.refusal.push_str(text);
    }

    async fn reasoning_delta(&mut self, text: &str) {
        self.reasoning.push_str(text);
    }

    async fn finish(&mut self, usage: Usage, _include_usage: bool) {
        self.usage = usage;
    }
}
