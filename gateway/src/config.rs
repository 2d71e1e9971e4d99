//! Proxy configuration: a `clap` CLI surface over the core's
//! environment-agnostic `ProxyConfig` (§6.5).

use std::collections::HashMap;

use clap::Parser;
use mcp_completions::ClientInfo;

use crate::url_context::ExtractServiceConfig;

#[derive(Debug, Parser)]
#[command(name = "mcp-completions-gateway", version, about)]
pub struct CliArgs {
    /// Address the HTTP server binds to.
    #[arg(long, env = "MCP_GATEWAY_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Upstream OpenAI-compatible `/chat/completions` endpoint.
    #[arg(long, env = "MCP_GATEWAY_UPSTREAM_URL")]
    pub upstream_url: String,

    /// `clientInfo.name` sent during the MCP `initialize` handshake.
    #[arg(long, env = "MCP_GATEWAY_CLIENT_NAME", default_value = "MCPCompletions")]
    pub client_name: String,

    /// `clientInfo.version` sent during the MCP `initialize` handshake.
    #[arg(long, env = "MCP_GATEWAY_CLIENT_VERSION", default_value = "1.0.0")]
    pub client_version: String,

    /// Hostname rewrite for the URL-context collaborator, `old=new`. Repeatable.
    #[arg(long = "shadow-host", value_parser = parse_shadow_host)]
    pub shadow_hosts: Vec<(String, String)>,

    /// Extract-service endpoint for the URL-context collaborator.
    #[arg(long, env = "MCP_GATEWAY_EXTRACT_SERVICE_URL")]
    pub extract_service_url: Option<String>,

    /// Bearer token sent to the extract service.
    #[arg(long, env = "MCP_GATEWAY_EXTRACT_SERVICE_TOKEN")]
    pub extract_service_token: Option<String>,

    /// Emit structured JSON logs instead of the human-readable format.
    #[arg(long, env = "MCP_GATEWAY_LOG_JSON")]
    pub log_json: bool,
}

fn parse_shadow_host(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(old, new)| (old.to_string(), new.to_string()))
        .ok_or_else(|| format!("expected old=new, got {raw:?}"))
}

/// Environment-agnostic configuration handed to the core pipeline.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub upstream_url: String,
    pub client_info: ClientInfo,
    pub shadow_hosts: HashMap<String, String>,
    pub extract_service: Option<ExtractServiceConfig>,
}

impl From<&CliArgs> for ProxyConfig {
    fn from(args: &CliArgs) -> Self {
        Self {
            upstream_url: args.upstream_url.clone(),
            client_info: ClientInfo {
                name: args.client_name.clone(),
                version: args.client_version.clone(),
            },
            shadow_hosts: args.shadow_hosts.iter().cloned().collect(),
            extract_service: args.extract_service_url.as_ref().map(|url| ExtractServiceConfig {
                url: url.clone(),
                bearer_token: args.extract_service_token.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_shadow_host_splits_on_equals() {
        assert_eq!(
            parse_shadow_host("old.example.com=new.example.com").unwrap(),
            ("old.example.com".to_string(), "new.example.com".to_string())
        );
    }

    #[test]
    fn parse_shadow_host_rejects_missing_equals() {
        assert!(parse_shadow_host("no-equals-sign").is_err());
    }
}
