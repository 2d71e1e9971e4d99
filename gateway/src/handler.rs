//! HTTP entry point: wires C1 (decode/validate) into C3 (tool discovery),
//! C4 (the orchestrator loop), and C5 (response emission).

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use mcp_completions::{build_registry, McpServerSpec};
use openai_protocol::chat::{ChatCompletionRequest, FunctionTool, McpToolSpec, RequestTool, Usage, UrlContextSpec};
use openai_protocol::validated::ValidatedJson;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::emitter;
use crate::error::GatewayError;
use crate::orchestrator::{self, OrchestratorDeps};
use crate::sink::{BufferingSink, ForwardingSink};
use crate::state::AppState;
use crate::url_context::UrlContextConfig;

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<ChatCompletionRequest>,
) -> Response {
    match run_pipeline(state, request, headers).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

pub async fn healthz() -> Response {
    axum::Json(serde_json::json!({"status": "ok"})).into_response()
}

struct PartitionedTools {
    function_tools: Vec<FunctionTool>,
    mcp_specs: Vec<McpToolSpec>,
    url_context: Option<UrlContextSpec>,
    /// Tool specs this proxy doesn't model (anything beyond `function`,
    /// `mcp`, `url_context`). Passed through to the upstream call unchanged
    /// per Design Note §9.
    other: Vec<Value>,
}

fn partition_tools(tools: Option<Vec<RequestTool>>) -> PartitionedTools {
    let mut partitioned = PartitionedTools {
        function_tools: Vec::new(),
        mcp_specs: Vec::new(),
        url_context: None,
        other: Vec::new(),
    };
    for tool in tools.into_iter().flatten() {
        match tool {
            RequestTool::Function(f) => partitioned.function_tools.push(f),
            RequestTool::Mcp(m) => partitioned.mcp_specs.push(m),
            RequestTool::UrlContext(u) => partitioned.url_context = Some(u),
            RequestTool::Other(v) => partitioned.other.push(v),
        }
    }
    partitioned
}

/// Headers forwarded verbatim to the upstream LLM, minus the ones that must
/// reflect this hop's own body rather than the caller's original request.
fn upstream_headers(mut headers: HeaderMap) -> HeaderMap {
    for hop_by_hop in ["host", "content-length", "content-type", "transfer-encoding"] {
        headers.remove(hop_by_hop);
    }
    headers
}

async fn run_pipeline(
    state: AppState,
    original: ChatCompletionRequest,
    caller_headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let partitioned = partition_tools(original.tools.clone());

    let mcp_specs: Vec<McpServerSpec> = partitioned
        .mcp_specs
        .iter()
        .map(|m| McpServerSpec {
            server_url: &m.server_url,
            authorization: m.authorization.as_deref(),
            allowed_tool_names: m.allowed_tools.as_ref().map(|a| a.tool_names.as_slice()),
        })
        .collect();
    let (registry, synthetic_tools) = build_registry(&state.sessions, &mcp_specs).await;

    let mut tools_for_upstream: Vec<RequestTool> = partitioned
        .function_tools
        .into_iter()
        .map(RequestTool::Function)
        .collect();
    tools_for_upstream.extend(synthetic_tools.into_iter().map(RequestTool::Other));
    tools_for_upstream.extend(partitioned.other.into_iter().map(RequestTool::Other));
    let tools_for_upstream = if tools_for_upstream.is_empty() {
        None
    } else {
        Some(tools_for_upstream)
    };

    let mut working = original.messages.clone();
    let mut initial_usage = Usage::default();
    if let Some(url_spec) = partitioned.url_context {
        let mut shadow_hosts = state.config.shadow_hosts.clone();
        if let Some(extra) = &url_spec.shadow_hosts {
            for (k, v) in extra {
                if let Some(v) = v.as_str() {
                    shadow_hosts.insert(k.clone(), v.to_string());
                }
            }
        }
        let config = UrlContextConfig {
            max_urls: url_spec.max_urls,
            max_context_length: url_spec.max_context_length,
            shadow_hosts,
            extract_service: state.config.extract_service.clone(),
        };
        let result = state.url_fetcher.fetch(&working, &config).await;
        initial_usage.additional_cost_cents = result.additional_cost_cents;
        if let Some(system_message) = crate::url_context::HttpUrlContextFetcher::as_system_message(&result) {
            working.insert(0, system_message);
        }
    }

    let deps = OrchestratorDeps {
        http: state.http.clone(),
        sessions: state.sessions.clone(),
        registry,
        upstream_url: state.config.upstream_url.clone(),
        upstream_headers: upstream_headers(caller_headers),
    };

    if original.stream {
        let (tx, rx) = mpsc::channel(32);
        let model = original.model.clone();
        let mut sink = ForwardingSink::new(tx.clone(), model);
        tokio::spawn(async move {
            if let Err(err) =
                orchestrator::run(&deps, &original, tools_for_upstream, working, initial_usage, &mut sink).await
            {
                tracing::error!(error = %err, "orchestrator aborted mid-stream");
                let _ = tx
                    .send(Err(std::io::Error::other(err.to_string())))
                    .await;
            }
        });
        let body = Body::from_stream(ReceiverStream::new(rx));
        Ok(emitter::streaming_response(body))
    } else {
        let mut sink = BufferingSink::default();
        orchestrator::run(&deps, &original, tools_for_upstream, working, initial_usage, &mut sink).await?;
        let model = original.model.clone();
        Ok(emitter::non_streaming_response(&model, sink))
    }
}
