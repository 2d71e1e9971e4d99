//! OpenAI-compatible `/v1/chat/completions` wire types.
//!
//! These mirror the upstream chat-completion request/response/streaming-chunk
//! shapes closely enough that a caller (or upstream provider) cannot tell
//! this proxy apart from a plain pass-through. Unknown fields on the request
//! are preserved via `other` and forwarded upstream untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

use crate::validated::Normalizable;

// ============================================================================
// Request
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_request_tools"))]
pub struct ChatCompletionRequest {
    pub model: String,

    #[validate(length(min = 1, message = "messages array is required and cannot be empty"))]
    pub messages: Vec<ChatMessage>,

    #[serde(default)]
    pub stream: bool,

    pub stream_options: Option<StreamOptions>,

    pub max_tokens: Option<u32>,

    pub max_completion_tokens: Option<u32>,

    pub temperature: Option<f32>,

    pub top_p: Option<f32>,

    pub tools: Option<Vec<RequestTool>>,

    pub tool_choice: Option<Value>,

    /// Every other OpenAI sampling field (`n`, `stop`, `seed`, `logit_bias`, ...),
    /// forwarded upstream verbatim without this proxy needing to model them.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Normalizable for ChatCompletionRequest {}

impl ChatCompletionRequest {
    /// The token budget the caller supplied, if any (`max_completion_tokens`
    /// takes precedence over the deprecated `max_tokens`, matching upstream
    /// precedence rules).
    pub fn requested_token_budget(&self) -> Option<u32> {
        self.max_completion_tokens.or(self.max_tokens)
    }

    pub fn wants_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .map(|o| o.include_usage)
            .unwrap_or(false)
    }
}

fn validate_request_tools(req: &ChatCompletionRequest) -> Result<(), ValidationError> {
    let Some(tools) = &req.tools else {
        return Ok(());
    };
    for tool in tools {
        if let RequestTool::Mcp(mcp) = tool {
            if mcp.server_url.trim().is_empty() {
                return Err(ValidationError::new("invalid_mcp_tools"));
            }
            match &mcp.require_approval {
                None => {}
                Some(Value::Null) => {}
                Some(Value::String(s)) if s == "never" => {}
                Some(_) => return Err(ValidationError::new("invalid_mcp_tools")),
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Function,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    pub content: Option<MessageContent>,

    pub tool_calls: Option<Vec<ToolCall>>,

    pub tool_call_id: Option<String>,

    pub name: Option<String>,

    /// Forwarded-only field: never re-sent upstream as part of a replayed
    /// assistant message, see the design notes on `reasoning_content`.
    pub reasoning_content: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
            reasoning_content: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
            reasoning_content: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.map(MessageContent::Text),
            tool_calls,
            tool_call_id: None,
            name: None,
            reasoning_content: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: None,
            reasoning_content: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamOptions {
    #[serde(default)]
    pub include_usage: bool,
}

// ============================================================================
// Tools (heterogeneous array, see design note on tagged variants)
// ============================================================================

/// A single entry of the caller's `tools` array.
///
/// `#[serde(untagged)]` with a JSON-`Value` catch-all lets unrecognised tool
/// shapes survive deserialization unchanged instead of failing the whole
/// request, matching the "decoders should tolerate unknown variants" design
/// note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestTool {
    Mcp(McpToolSpec),
    UrlContext(UrlContextSpec),
    Function(FunctionTool),
    Other(Value),
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub tool_type: FunctionToolType,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FunctionToolType {
    Function,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<Value>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolSpec {
    #[serde(rename = "type")]
    pub tool_type: McpToolType,
    pub server_url: String,
    pub authorization: Option<String>,
    pub allowed_tools: Option<McpAllowedTools>,
    pub require_approval: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpToolType {
    Mcp,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpAllowedTools {
    pub tool_names: Vec<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlContextSpec {
    #[serde(rename = "type")]
    pub tool_type: UrlContextToolType,
    pub max_urls: Option<u32>,
    pub max_context_length: Option<usize>,
    pub shadow_hosts: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UrlContextToolType {
    UrlContext,
}

// ============================================================================
// Usage
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub additional_cost_cents: u64,
}

impl Usage {
    pub fn accumulate(&mut self, round: &Usage) {
        self.prompt_tokens += round.prompt_tokens;
        self.completion_tokens += round.completion_tokens;
        self.total_tokens += round.total_tokens;
        self.additional_cost_cents += round.additional_cost_cents;
    }
}

// ============================================================================
// Responses
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    pub usage: Option<Usage>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

/// Outbound delta shape this proxy emits to the caller. Unlike the upstream
/// SSE chunks this proxy consumes (inspected as untyped `Value` in the
/// orchestrator, since tool-call deltas arrive fragmented across chunks and
/// are folded by index before being re-expressed as a single finalized
/// `ToolCall`), the proxy never re-streams raw upstream tool-call deltas —
/// it only ever announces role, content, refusal, or reasoning pieces.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub refusal: Option<String>,
    pub reasoning_content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_never_approval() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"type": "mcp", "server_url": "https://x", "require_approval": "always"}],
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn accepts_absent_or_never_approval() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"type": "mcp", "server_url": "https://x", "require_approval": "never"}],
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_empty_server_url() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"type": "mcp", "server_url": ""}],
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn other_fields_round_trip() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "seed": 7,
        }))
        .unwrap();
        assert_eq!(req.other.get("seed").unwrap(), 7);
    }
}
