//! Binary entry point: parses CLI/env configuration, wires up the shared
//! [`AppState`], and serves the router built by the library crate.

use std::sync::Arc;

use clap::Parser;
use mcp_completions_gateway::config::{CliArgs, ProxyConfig};
use mcp_completions_gateway::state::AppState;
use mcp_completions_gateway::url_context::{HttpUrlContextFetcher, UrlContextFetcher};
use mcp_completions_gateway::{build_router, UPSTREAM_TIMEOUT};
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().with_current_span(false).init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();
    init_tracing(cli.log_json);

    let config = ProxyConfig::from(&cli);
    let http = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()?;
    let url_fetcher: Arc<dyn UrlContextFetcher> =
        Arc::new(HttpUrlContextFetcher::new(http.clone()));
    let state = AppState::new(config, url_fetcher, http);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!(bind = %cli.bind, upstream = %cli.upstream_url, "mcp-completions-gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
