//! End-to-end tests driving the full router against in-process fake
//! upstream LLM and MCP servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use mcp_completions_gateway::config::ProxyConfig;
use mcp_completions_gateway::state::AppState;
use mcp_completions_gateway::url_context::HttpUrlContextFetcher;
use mcp_completions::ClientInfo;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

async fn spawn_axum(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn sse_frame(body: Value) -> String {
    format!("data: {}\n\n", serde_json::to_string(&body).unwrap())
}

async fn test_router(upstream_url: String) -> Router {
    let http = reqwest::Client::new();
    let config = ProxyConfig {
        upstream_url,
        client_info: ClientInfo::default(),
        shadow_hosts: Default::default(),
        extract_service: None,
    };
    let url_fetcher = Arc::new(HttpUrlContextFetcher::new(http.clone()));
    let state = AppState::new(config, url_fetcher, http);
    mcp_completions_gateway::build_router(state)
}

/// A no-tools upstream that always emits two content deltas, a `stop`
/// finish reason, and a usage block, regardless of how many times it is
/// polled across the test suite.
async fn plain_upstream_handler() -> Body {
    let mut body = String::new();
    body.push_str(&sse_frame(json!({
        "id": "up-1", "object": "chat.completion.chunk", "created": 1, "model": "gpt-test",
        "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}],
    })));
    body.push_str(&sse_frame(json!({
        "id": "up-1", "object": "chat.completion.chunk", "created": 1, "model": "gpt-test",
        "choices": [{"index": 0, "delta": {"content": "Hello, "}, "finish_reason": null}],
    })));
    body.push_str(&sse_frame(json!({
        "id": "up-1", "object": "chat.completion.chunk", "created": 1, "model": "gpt-test",
        "choices": [{"index": 0, "delta": {"content": "world!"}, "finish_reason": null}],
    })));
    body.push_str(&sse_frame(json!({
        "id": "up-1", "object": "chat.completion.chunk", "created": 1, "model": "gpt-test",
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12},
    })));
    body.push_str("data: [DONE]\n\n");
    Body::from(body)
}

async fn spawn_plain_upstream() -> String {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { plain_upstream_handler().await }),
    );
    let base = spawn_axum(router).await;
    format!("{base}/v1/chat/completions")
}

#[tokio::test]
async fn streaming_request_without_tools_forwards_upstream_deltas() {
    let upstream_url = spawn_plain_upstream().await;
    let app = test_router(upstream_url).await;

    let payload = json!({
        "model": "gpt-test",
        "stream": true,
        "messages": [{"role": "user", "content": "hi"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("Hello, "));
    assert!(text.contains("world!"));
    assert!(text.contains("\"finish_reason\":\"stop\""));
    assert!(text.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn non_streaming_request_without_tools_returns_full_message() {
    let upstream_url = spawn_plain_upstream().await;
    let app = test_router(upstream_url).await;

    let payload = json!({
        "model": "gpt-test",
        "stream": false,
        "messages": [{"role": "user", "content": "hi"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello, world!");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 12);
}

#[tokio::test]
async fn invalid_require_approval_returns_bad_request() {
    let upstream_url = spawn_plain_upstream().await;
    let app = test_router(upstream_url).await;

    let payload = json!({
        "model": "gpt-test",
        "messages": [{"role": "user", "content": "hi"}],
        "tools": [{"type": "mcp", "server_url": "https://tools.example.com", "require_approval": "always"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Drives one full tool-call round trip: the upstream first asks for a
/// synthetic MCP tool, then the gateway dispatches it against a fake MCP
/// server and feeds the result back for a final round.
#[derive(Clone, Default)]
struct ToolCallUpstream {
    round: Arc<AtomicUsize>,
}

async fn tool_call_upstream_handler(
    State(shared): State<ToolCallUpstream>,
    _body: axum::Json<Value>,
) -> Body {
    let round = shared.round.fetch_add(1, Ordering::SeqCst);
    if round == 0 {
        let mut body = String::new();
        body.push_str(&sse_frame(json!({
            "id": "up-1", "object": "chat.completion.chunk", "created": 1, "model": "gpt-test",
            "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}],
        })));
        body.push_str(&sse_frame(json!({
            "id": "up-1", "object": "chat.completion.chunk", "created": 1, "model": "gpt-test",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{
                    "index": 0, "id": "call_1", "type": "function",
                    "function": {"name": "mcp_tool_127-0-0-1_search", "arguments": ""},
                }]},
                "finish_reason": null,
            }],
        })));
        body.push_str(&sse_frame(json!({
            "id": "up-1", "object": "chat.completion.chunk", "created": 1, "model": "gpt-test",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"q\":\"x\"}"}}]},
                "finish_reason": "tool_calls",
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8},
        })));
        body.push_str("data: [DONE]\n\n");
        Body::from(body)
    } else {
        let mut body = String::new();
        body.push_str(&sse_frame(json!({
            "id": "up-2", "object": "chat.completion.chunk", "created": 2, "model": "gpt-test",
            "choices": [{"index": 0, "delta": {"content": "All done."}, "finish_reason": null}],
        })));
        body.push_str(&sse_frame(json!({
            "id": "up-2", "object": "chat.completion.chunk", "created": 2, "model": "gpt-test",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 4, "total_tokens": 24},
        })));
        body.push_str("data: [DONE]\n\n");
        Body::from(body)
    }
}

async fn spawn_tool_call_upstream() -> String {
    let shared = ToolCallUpstream::default();
    let router = Router::new()
        .route("/v1/chat/completions", post(tool_call_upstream_handler))
        .with_state(shared);
    let base = spawn_axum(router).await;
    format!("{base}/v1/chat/completions")
}

async fn mcp_handler(axum::Json(body): axum::Json<Value>) -> axum::Json<Value> {
    let method = body.get("method").and_then(Value::as_str).unwrap_or("");
    let id = body.get("id").cloned().unwrap_or(Value::Null);
    axum::Json(match method {
        "initialize" => json!({"jsonrpc": "2.0", "id": id, "result": {"protocolVersion": "2025-06-18"}}),
        "notifications/initialized" => Value::Null,
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": [{"name": "search", "description": "search things", "inputSchema": {"type": "object"}}]},
        }),
        "tools/call" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"content": [{"type": "text", "text": "found it"}]},
        }),
        other => json!({"jsonrpc": "2.0", "id": id, "error": {"message": format!("unknown method {other}")}}),
    })
}

async fn spawn_mcp_server() -> String {
    let router = Router::new().route("/mcp", post(mcp_handler));
    let base = spawn_axum(router).await;
    format!("{base}/mcp")
}

#[tokio::test]
async fn mcp_tool_call_round_trips_through_the_registry() {
    let upstream_url = spawn_tool_call_upstream().await;
    let mcp_url = spawn_mcp_server().await;
    let app = test_router(upstream_url).await;

    let payload = json!({
        "model": "gpt-test",
        "stream": false,
        "messages": [{"role": "user", "content": "search for x"}],
        "tools": [{"type": "mcp", "server_url": mcp_url, "require_approval": "never"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("found it"));
    assert!(content.contains("All done."));
    assert_eq!(body["usage"]["total_tokens"], 32);
}
