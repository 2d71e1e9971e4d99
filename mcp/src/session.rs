//! MCP session lifecycle: handshake, tool listing, and tool invocation.
//!
//! A [`SessionManager`] holds one [`Session`] per `server_url`, created
//! lazily on first use and re-created after a 404 signals server-side
//! expiry. Sessions are never persisted beyond the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{McpError, McpResult};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Identifies this client to MCP servers during the `initialize` handshake.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "MCPCompletions".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// A tool as discovered via `tools/list`.
#[derive(Debug, Clone)]
pub struct ToolRecord {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
    #[allow(dead_code)]
    pub output_schema: Option<Value>,
}

#[derive(Debug, Default)]
struct Session {
    session_id: Option<String>,
    initialized: bool,
    tools: Vec<ToolRecord>,
}

/// Per-process map of live MCP sessions, keyed by `server_url`.
///
/// Concurrent requests targeting the same server share one entry; the inner
/// `Mutex` bounds initialisation to a single in-flight handshake per server
/// (the mutex-guarded alternative from the design notes, rather than
/// tolerating duplicate concurrent inits).
pub struct SessionManager {
    http: Client,
    client_info: ClientInfo,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(http: Client, client_info: ClientInfo) -> Self {
        Self {
            http,
            client_info,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn entry(&self, server_url: &str) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(server_url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::default())))
            .clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the tools discovered on `server_url`, initialising the
    /// session first if needed.
    pub async fn tools(
        &self,
        server_url: &str,
        authorization: Option<&str>,
    ) -> McpResult<Vec<ToolRecord>> {
        let entry = self.entry(server_url);
        let mut state = entry.lock().await;
        if !state.initialized {
            self.initialize(server_url, authorization, &mut state)
                .await?;
        }
        Ok(state.tools.clone())
    }

    async fn initialize(
        &self,
        server_url: &str,
        authorization: Option<&str>,
        state: &mut Session,
    ) -> McpResult<()> {
        let init_body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "roots": {"listChanged": true},
                    "sampling": {},
                },
                "clientInfo": {
                    "name": self.client_info.name,
                    "version": self.client_info.version,
                },
            },
        });

        let resp = self
            .post(server_url, authorization, None, &init_body)
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(McpError::InitFailed {
                server_url: server_url.to_string(),
                message: format!("initialize returned {status}: {body}"),
            });
        }
        let session_id = resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let payload = parse_rpc_body(resp).await?;
        if let Some(err) = payload.get("error") {
            return Err(McpError::InitFailed {
                server_url: server_url.to_string(),
                message: format!("initialize returned a JSON-RPC error: {err}"),
            });
        }

        let notify = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        });
        self.post(server_url, authorization, session_id.as_deref(), &notify)
            .await?;

        let list_body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": "tools/list",
        });
        let resp = self
            .post(server_url, authorization, session_id.as_deref(), &list_body)
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(McpError::InitFailed {
                server_url: server_url.to_string(),
                message: format!("tools/list returned {status}: {body}"),
            });
        }
        let payload = parse_rpc_body(resp).await?;
        if let Some(err) = payload.get("error") {
            return Err(McpError::InitFailed {
                server_url: server_url.to_string(),
                message: format!("tools/list returned a JSON-RPC error: {err}"),
            });
        }
        let tools = payload
            .get("result")
            .and_then(|r| r.get("tools"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| {
                let name = t.get("name")?.as_str()?.to_string();
                Some(ToolRecord {
                    name,
                    description: t
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    input_schema: t.get("inputSchema").cloned(),
                    output_schema: t.get("outputSchema").cloned(),
                })
            })
            .collect();

        debug!(server_url, session_id = ?session_id, "MCP session initialised");
        state.session_id = session_id;
        state.initialized = true;
        state.tools = tools;
        Ok(())
    }

    /// Invokes `original_name` on `server_url`, re-initialising the session
    /// first if it isn't live yet.
    pub async fn call(
        &self,
        server_url: &str,
        original_name: &str,
        arguments: Value,
        authorization: Option<&str>,
    ) -> McpResult<Value> {
        let entry = self.entry(server_url);
        let session_id = {
            let mut state = entry.lock().await;
            if !state.initialized {
                self.initialize(server_url, authorization, &mut state)
                    .await?;
            }
            state.session_id.clone()
        };

        let call_body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": "tools/call",
            "params": {
                "name": original_name,
                "arguments": arguments,
            },
        });
        let resp = self
            .post(server_url, authorization, session_id.as_deref(), &call_body)
            .await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND && session_id.is_some() {
            warn!(server_url, "MCP session evicted by server (404), dropping cached session");
            self.sessions.remove(server_url);
            return Err(McpError::SessionExpired);
        }
        if status == StatusCode::UNAUTHORIZED {
            let hostname = hostname_of(server_url);
            return Err(McpError::AuthFailed { hostname });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(McpError::CallFailed {
                server_url: server_url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let payload = parse_rpc_body(resp).await?;
        if let Some(err) = payload.get("error") {
            return Err(McpError::JsonRpc(err.to_string()));
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn post(
        &self,
        server_url: &str,
        authorization: Option<&str>,
        session_id: Option<&str>,
        body: &Value,
    ) -> McpResult<reqwest::Response> {
        let mut req = self
            .http
            .post(server_url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json,text/event-stream")
            .header("MCP-Protocol-Version", PROTOCOL_VERSION)
            .json(body);
        if let Some(auth) = authorization {
            req = req.header("Authorization", auth);
        }
        if let Some(sid) = session_id {
            req = req.header("Mcp-Session-Id", sid);
        }
        Ok(req.send().await?)
    }
}

/// Extracts the hostname from an absolute URL, falling back to the raw
/// string if it doesn't parse (used only for error messages).
pub fn hostname_of(server_url: &str) -> String {
    url::Url::parse(server_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| server_url.to_string())
}

/// Parses an MCP response body, whether it arrived as `application/json`
/// or as `text/event-stream` SSE framing.
async fn parse_rpc_body(resp: reqwest::Response) -> McpResult<Value> {
    let is_event_stream = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/event-stream"))
        .unwrap_or(false);
    let body = resp.text().await?;

    if is_event_stream {
        for line in body.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" || line.starts_with(':') {
                continue;
            }
            if let Ok(value) = serde_json::from_str::<Value>(data) {
                if value.get("jsonrpc").and_then(Value::as_str) == Some("2.0") {
                    return Ok(value);
                }
            }
        }
        return Err(McpError::InvalidResponse(
            "no JSON-RPC payload found in event-stream response".to_string(),
        ));
    }

    if body.trim().is_empty() {
        return Err(McpError::InvalidResponse("empty response body".to_string()));
    }
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_of_strips_scheme_and_path() {
        assert_eq!(hostname_of("https://example.com/mcp"), "example.com");
    }

    #[test]
    fn hostname_of_falls_back_on_unparseable_url() {
        assert_eq!(hostname_of("not a url"), "not a url");
    }
}
