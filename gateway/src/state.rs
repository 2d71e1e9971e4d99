//! Shared process state handed to every request.

use std::sync::Arc;

use mcp_completions::SessionManager;

use crate::config::ProxyConfig;
use crate::url_context::UrlContextFetcher;

#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
    pub sessions: Arc<SessionManager>,
    pub url_fetcher: Arc<dyn UrlContextFetcher>,
    pub config: Arc<ProxyConfig>,
}

impl AppState {
    pub fn new(
        config: ProxyConfig,
        url_fetcher: Arc<dyn UrlContextFetcher>,
        http: reqwest::Client,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(http.clone(), config.client_info.clone()));
        Self {
            http,
            sessions,
            url_fetcher,
            config: Arc::new(config),
        }
    }
}
