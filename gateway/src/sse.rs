//! Upstream SSE framing: turns a streaming `/chat/completions` response
//! body into a sequence of parsed JSON chunk events.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use crate::error::GatewayError;

pub struct UpstreamSseReader {
    stream: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
    done: bool,
}

impl UpstreamSseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            stream: response.bytes_stream().boxed(),
            buffer: String::new(),
            done: false,
        }
    }

    /// Returns the next parsed JSON-RPC-free chunk payload, or `None` once
    /// `data: [DONE]` is seen or the upstream body closes.
    pub async fn next_chunk(&mut self) -> Option<Result<Value, GatewayError>> {
        loop {
            if self.done {
                return None;
            }
            if let Some(idx) = self.buffer.find("\n\n") {
                let frame: String = self.buffer.drain(..idx + 2).collect();
                if let Some(event) = self.parse_frame(frame.trim()) {
                    return event;
                }
                continue;
            }

            match self.stream.next().await {
                Some(Ok(bytes)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(GatewayError::StreamError(err.to_string())));
                }
                None => {
                    self.done = true;
                    let remainder = std::mem::take(&mut self.buffer);
                    return self.parse_frame(remainder.trim());
                }
            }
        }
    }

    /// Returns `Some(event)` if the frame carried a usable `data:` line,
    /// `None` if it should be skipped (blank, comment, or `[DONE]`) so the
    /// caller keeps reading.
    fn parse_frame(&mut self, frame: &str) -> Option<Option<Result<Value, GatewayError>>> {
        for line in frame.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                self.done = true;
                return Some(None);
            }
            return Some(Some(
                serde_json::from_str(data).map_err(GatewayError::from),
            ));
        }
        None
    }
}
