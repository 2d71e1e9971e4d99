//! Completion Loop Orchestrator (C4) — the heart of the proxy.
//!
//! Drives the LLM dialog as a sequence of rounds, each one upstream
//! streaming chat-completion call. Buffers tool-call deltas, dispatches
//! finalized calls against the registered MCP servers, and folds their
//! results back into the working conversation before the next round.

use std::collections::BTreeMap;

use mcp_completions::{hostname_of, SessionManager, ToolRegistry};
use openai_protocol::chat::{
    ChatCompletionRequest, ChatMessage, FunctionCall, MessageContent, RequestTool, Role,
    StreamOptions, ToolCall, Usage,
};
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::sink::ChunkSink;
use crate::sse::UpstreamSseReader;
use crate::tool_format::{format_dispatch_error, format_invocation, format_result};

pub struct OrchestratorDeps {
    pub http: reqwest::Client,
    pub sessions: std::sync::Arc<SessionManager>,
    pub registry: ToolRegistry,
    pub upstream_url: String,
    pub upstream_headers: HeaderMap,
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: String,
    arguments: String,
}

struct FinalizedCall {
    id: String,
    name: String,
    arguments: Value,
}

#[derive(PartialEq)]
enum RoundFinish {
    ToolCalls,
    Stopped,
    StreamEnded,
}

/// Runs the full multi-round loop, pushing every caller-visible piece
/// through `sink`, and returns once the loop has terminated.
pub async fn run(
    deps: &OrchestratorDeps,
    original: &ChatCompletionRequest,
    tools_for_upstream: Option<Vec<RequestTool>>,
    mut working: Vec<ChatMessage>,
    initial_usage: Usage,
    sink: &mut dyn ChunkSink,
) -> Result<(), GatewayError> {
    sink.role_announcement().await;

    let mut usage_total = initial_usage;
    let mut budget = original.requested_token_budget().map(|b| b as i64);

    loop {
        let round_request = build_round_request(original, &working, &tools_for_upstream, budget);
        let response = deps
            .http
            .post(&deps.upstream_url)
            .headers(deps.upstream_headers.clone())
            .json(&round_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::UpstreamNon2xx {
                endpoint: deps.upstream_url.clone(),
                status,
                body,
            });
        }

        let mut reader = UpstreamSseReader::new(response);
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut accumulators: BTreeMap<usize, ToolCallAccumulator> = BTreeMap::new();
        let mut round_usage: Option<Usage> = None;
        let mut finish = RoundFinish::StreamEnded;

        while let Some(event) = reader.next_chunk().await {
            let chunk = event?;
            let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) else {
                continue;
            };

            if let Some(delta) = choice.get("delta") {
                if let Some(text) = delta.get("content").and_then(Value::as_str) {
                    content.push_str(text);
                    sink.content_delta(text).await;
                }
                if let Some(text) = delta.get("refusal").and_then(Value::as_str) {
                    sink.refusal_delta(text).await;
                }
                if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
                    reasoning.push_str(text);
                    sink.reasoning_delta(text).await;
                }
                if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
                    for tc in tool_calls {
                        fold_tool_call_delta(&mut accumulators, tc);
                    }
                }
            }

            let finish_reason = choice.get("finish_reason").and_then(Value::as_str);
            if let Some(usage_value) = chunk.get("usage") {
                round_usage = serde_json::from_value(usage_value.clone()).ok();
            }

            match finish_reason {
                Some("tool_calls") => {
                    finish = RoundFinish::ToolCalls;
                    break;
                }
                Some("stop") | Some("length") => {
                    finish = RoundFinish::Stopped;
                    break;
                }
                _ => {}
            }
        }

        let finalized = finalize_tool_calls(accumulators);
        let assistant_tool_calls = if finalized.is_empty() {
            None
        } else {
            Some(
                finalized
                    .iter()
                    .map(|call| ToolCall {
                        id: call.id.clone(),
                        tool_type: "function".to_string(),
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: serde_json::to_string(&call.arguments)
                                .unwrap_or_else(|_| "{}".to_string()),
                        },
                    })
                    .collect(),
            )
        };
        working.push(ChatMessage {
            role: Role::Assistant,
            content: if content.is_empty() {
                None
            } else {
                Some(MessageContent::Text(content.clone()))
            },
            tool_calls: assistant_tool_calls,
            tool_call_id: None,
            name: None,
            reasoning_content: None,
        });

        let round_usage = round_usage.unwrap_or_default();
        usage_total.accumulate(&round_usage);
        if let Some(remaining) = budget.as_mut() {
            *remaining -= round_usage.completion_tokens as i64;
        }

        if finish == RoundFinish::Stopped || finalized.is_empty() {
            break;
        }
        if budget.is_some_and(|b| b <= 0) {
            debug!("token budget exhausted, ending loop without dispatching further tool calls");
            break;
        }

        for call in &finalized {
            let rendered = dispatch_tool_call(deps, call, sink).await;
            working.push(ChatMessage::tool_result(call.id.clone(), rendered));
        }
    }

    sink.finish(usage_total, original.wants_usage()).await;
    Ok(())
}

fn build_round_request(
    original: &ChatCompletionRequest,
    working: &[ChatMessage],
    tools: &Option<Vec<RequestTool>>,
    budget: Option<i64>,
) -> ChatCompletionRequest {
    let mut round = original.clone();
    round.messages = working.to_vec();
    round.stream = true;
    round.stream_options = Some(StreamOptions { include_usage: true });
    round.tools = tools.clone();
    if let Some(remaining) = budget {
        let remaining = remaining.max(0) as u32;
        round.max_completion_tokens = Some(remaining);
        round.max_tokens = None;
    }
    round
}

fn fold_tool_call_delta(accumulators: &mut BTreeMap<usize, ToolCallAccumulator>, tc: &Value) {
    let index = tc.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
    let acc = accumulators.entry(index).or_default();
    if let Some(id) = tc.get("id").and_then(Value::as_str) {
        if acc.id.is_none() {
            acc.id = Some(id.to_string());
        }
    }
    if let Some(function) = tc.get("function") {
        if let Some(name) = function.get("name").and_then(Value::as_str) {
            acc.name.push_str(name);
        }
        if let Some(arguments) = function.get("arguments").and_then(Value::as_str) {
            acc.arguments.push_str(arguments);
        }
    }
}

fn finalize_tool_calls(accumulators: BTreeMap<usize, ToolCallAccumulator>) -> Vec<FinalizedCall> {
    let mut out = Vec::with_capacity(accumulators.len());
    for (index, acc) in accumulators {
        if acc.name.is_empty() || acc.arguments.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&acc.arguments) {
            Ok(arguments) => out.push(FinalizedCall {
                id: acc.id.unwrap_or_else(|| format!("call_{index}")),
                name: acc.name,
                arguments,
            }),
            Err(err) => {
                warn!(tool_name = acc.name, error = %err, "dropping tool call with unparseable arguments");
            }
        }
    }
    out
}

async fn dispatch_tool_call(
    deps: &OrchestratorDeps,
    call: &FinalizedCall,
    sink: &mut dyn ChunkSink,
) -> String {
    let Some(entry) = deps.registry.lookup(&call.name) else {
        let message = format_dispatch_error(&format!(
            "no handler registered for tool \"{}\"",
            call.name
        ));
        sink.content_delta(&message).await;
        return message;
    };

    let hostname = hostname_of(&entry.server_url);
    let invocation = format_invocation(&call.name, &hostname, &call.arguments);
    sink.content_delta(&invocation).await;

    match deps
        .sessions
        .call(
            &entry.server_url,
            &entry.original_name,
            call.arguments.clone(),
            entry.authorization.as_deref(),
        )
        .await
    {
        Ok(result) => {
            let rendered = format_result(&result);
            sink.content_delta(&rendered).await;
            rendered
        }
        Err(err) => {
            let message = format_dispatch_error(&err.to_string());
            sink.content_delta(&message).await;
            message
        }
    }
}
