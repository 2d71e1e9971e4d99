//! Synthetic function-name mapping for remote MCP tools (component C3).
//!
//! Translates the tools discovered on each MCP server into plain `function`
//! tool specs the upstream LLM understands, and keeps the reverse mapping
//! needed to dispatch a model-issued tool call back to its origin server.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::warn;

use crate::session::{hostname_of, SessionManager, ToolRecord};

pub const SYNTHETIC_PREFIX: &str = "mcp_tool_";

/// Reverse-mapping entry for one synthetic function name.
#[derive(Debug, Clone)]
pub struct SyntheticToolEntry {
    pub server_url: String,
    pub original_name: String,
    pub authorization: Option<String>,
}

/// Immutable once built; maps `mcp_tool_<dashed-host>_<name>` back to its
/// origin server and authorization for the lifetime of one request.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: HashMap<String, SyntheticToolEntry>,
}

impl ToolRegistry {
    pub fn lookup(&self, synthetic_name: &str) -> Option<&SyntheticToolEntry> {
        self.entries.get(synthetic_name)
    }

    pub fn is_mcp_tool(name: &str) -> bool {
        name.starts_with(SYNTHETIC_PREFIX)
    }
}

fn dashed_hostname(server_url: &str) -> String {
    hostname_of(server_url).replace('.', "-")
}

pub fn synthetic_name(server_url: &str, original_name: &str) -> String {
    format!("{SYNTHETIC_PREFIX}{}_{original_name}", dashed_hostname(server_url))
}

/// One MCP tool spec from the caller's `tools` array, reduced to what the
/// registry needs (the full request type lives in `openai-protocol`).
pub struct McpServerSpec<'a> {
    pub server_url: &'a str,
    pub authorization: Option<&'a str>,
    pub allowed_tool_names: Option<&'a [String]>,
}

/// Discovers tools on every `mcp` server spec in the request and builds the
/// synthetic `function` tool list plus the reverse-mapping registry.
///
/// Initialisation failures are tolerated per server: that server's tools are
/// simply omitted and the failure is logged, matching the partial-failure
/// policy in the design notes.
pub async fn build_registry(
    sessions: &SessionManager,
    specs: &[McpServerSpec<'_>],
) -> (ToolRegistry, Vec<Value>) {
    let mut registry = ToolRegistry::default();
    let mut synthetic_tools = Vec::new();

    for spec in specs {
        let tools = match sessions.tools(spec.server_url, spec.authorization).await {
            Ok(tools) => tools,
            Err(err) => {
                warn!(
                    server_url = spec.server_url,
                    error = %err,
                    "MCP server initialisation failed, skipping its tools"
                );
                continue;
            }
        };

        let hostname = hostname_of(spec.server_url);
        for tool in tools {
            if let Some(allowed) = spec.allowed_tool_names {
                if !allowed.iter().any(|n| n == &tool.name) {
                    continue;
                }
            }
            let name = synthetic_name(spec.server_url, &tool.name);
            if registry.entries.contains_key(&name) {
                warn!(name, "duplicate synthetic MCP tool name, keeping the first");
                continue;
            }
            synthetic_tools.push(function_tool_json(&name, &hostname, &tool));
            registry.entries.insert(
                name,
                SyntheticToolEntry {
                    server_url: spec.server_url.to_string(),
                    original_name: tool.name,
                    authorization: spec.authorization.map(str::to_string),
                },
            );
        }
    }

    (registry, synthetic_tools)
}

fn function_tool_json(synthetic_name: &str, hostname: &str, tool: &ToolRecord) -> Value {
    let description = tool
        .description
        .clone()
        .unwrap_or_else(|| tool.name.clone());
    json!({
        "type": "function",
        "function": {
            "name": synthetic_name,
            "description": format!("{description} (via MCP server: {hostname})"),
            "parameters": tool.input_schema.clone().unwrap_or_else(|| json!({})),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_name_dashes_the_hostname() {
        assert_eq!(
            synthetic_name("https://api.example.com/mcp", "search"),
            "mcp_tool_api-example-com_search"
        );
    }

    #[test]
    fn is_mcp_tool_checks_prefix() {
        assert!(ToolRegistry::is_mcp_tool("mcp_tool_x_y"));
        assert!(!ToolRegistry::is_mcp_tool("plain_function"));
    }
}
