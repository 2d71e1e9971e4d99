//! URL-context collaborator (§6.4): a thin pre-processor that extracts URLs
//! from the most recent user message, fetches their content, and returns a
//! system-message body to prepend to the working conversation.
//!
//! This is a concrete but intentionally minimal implementation behind the
//! [`UrlContextFetcher`] trait — not part of the hard core's testable
//! properties, and swappable without touching C1-C5.

use std::collections::HashMap;

use async_trait::async_trait;
use openai_protocol::chat::{ChatMessage, MessageContent};
use regex::Regex;
use reqwest::Client;
use tracing::warn;

/// Configuration carried by a `url_context` tool spec plus the proxy's
/// static `shadow_hosts`/`extract_service` settings (§6.5).
#[derive(Debug, Clone, Default)]
pub struct UrlContextConfig {
    pub max_urls: Option<u32>,
    pub max_context_length: Option<usize>,
    pub shadow_hosts: HashMap<String, String>,
    pub extract_service: Option<ExtractServiceConfig>,
}

#[derive(Debug, Clone)]
pub struct ExtractServiceConfig {
    pub url: String,
    pub bearer_token: Option<String>,
}

/// Result of running the URL-context collaborator.
#[derive(Debug, Default)]
pub struct UrlContextResult {
    pub context: Option<String>,
    pub additional_cost_cents: u64,
}

#[async_trait]
pub trait UrlContextFetcher: Send + Sync {
    async fn fetch(&self, messages: &[ChatMessage], config: &UrlContextConfig) -> UrlContextResult;
}

const DEFAULT_MAX_URLS: u32 = 5;
const DEFAULT_MAX_CONTEXT_LENGTH: usize = 8192;

pub struct HttpUrlContextFetcher {
    http: Client,
    url_regex: Regex,
}

impl HttpUrlContextFetcher {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            url_regex: Regex::new(r"https://[^\s)\]}>]+").expect("valid url regex"),
        }
    }

    fn extract_urls(&self, messages: &[ChatMessage], max_urls: u32) -> Vec<String> {
        let Some(last_user) = messages.iter().rev().find_map(|m| match &m.content {
            Some(MessageContent::Text(text)) if matches!(m.role, openai_protocol::chat::Role::User) => {
                Some(text.as_str())
            }
            _ => None,
        }) else {
            return Vec::new();
        };
        self.url_regex
            .find_iter(last_user)
            .map(|m| m.as_str().to_string())
            .take(max_urls as usize)
            .collect()
    }

    fn apply_shadow_hosts(&self, url: &str, shadow_hosts: &HashMap<String, String>) -> String {
        let Ok(mut parsed) = url::Url::parse(url) else {
            return url.to_string();
        };
        if let Some(host) = parsed.host_str() {
            if let Some(replacement) = shadow_hosts.get(host) {
                let _ = parsed.set_host(Some(replacement));
            }
        }
        parsed.to_string()
    }
}

#[async_trait]
impl UrlContextFetcher for HttpUrlContextFetcher {
    async fn fetch(&self, messages: &[ChatMessage], config: &UrlContextConfig) -> UrlContextResult {
        let max_urls = config.max_urls.unwrap_or(DEFAULT_MAX_URLS);
        let max_len = config.max_context_length.unwrap_or(DEFAULT_MAX_CONTEXT_LENGTH);
        let urls = self.extract_urls(messages, max_urls);
        if urls.is_empty() {
            return UrlContextResult::default();
        }

        let mut sections = Vec::new();
        let mut additional_cost_cents = 0u64;

        for url in &urls {
            let fetch_url = self.apply_shadow_hosts(url, &config.shadow_hosts);
            let fetched = if let Some(extract) = &config.extract_service {
                self.fetch_via_extract_service(&fetch_url, extract).await
            } else {
                self.fetch_directly(&fetch_url).await
            };
            match fetched {
                Ok((body, cost)) => {
                    additional_cost_cents += cost;
                    let mut truncated = body;
                    truncated.truncate(max_len);
                    sections.push(format!("URL: {url}\n\n{truncated}"));
                }
                Err(err) => {
                    warn!(url, error = %err, "url-context fetch failed, skipping");
                }
            }
        }

        if sections.is_empty() {
            return UrlContextResult {
                context: None,
                additional_cost_cents,
            };
        }

        UrlContextResult {
            context: Some(sections.join("\n\n---\n\n")),
            additional_cost_cents,
        }
    }
}

impl HttpUrlContextFetcher {
    async fn fetch_directly(&self, url: &str) -> Result<(String, u64), reqwest::Error> {
        let body = self.http.get(url).send().await?.text().await?;
        Ok((body, 0))
    }

    async fn fetch_via_extract_service(
        &self,
        url: &str,
        extract: &ExtractServiceConfig,
    ) -> Result<(String, u64), reqwest::Error> {
        let mut req = self.http.post(&extract.url).json(&serde_json::json!({ "url": url }));
        if let Some(token) = &extract.bearer_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let body: serde_json::Value = resp.json().await?;
        let text = body
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let cost = body
            .get("cost_cents")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        Ok((text, cost))
    }

    pub fn as_system_message(result: &UrlContextResult) -> Option<ChatMessage> {
        result.context.as_ref().map(|ctx| {
            ChatMessage::system(format!(
                "The user referenced the following URL(s); their fetched content follows:\n\n{ctx}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_urls_reads_the_last_user_message() {
        let fetcher = HttpUrlContextFetcher::new(Client::new());
        let messages = vec![
            ChatMessage::user("check https://example.com/a please"),
            ChatMessage::system("ignored"),
            ChatMessage::user("also see https://example.org/b and https://example.net/c"),
        ];
        let urls = fetcher.extract_urls(&messages, 5);
        assert_eq!(
            urls,
            vec![
                "https://example.org/b".to_string(),
                "https://example.net/c".to_string()
            ]
        );
    }

    #[test]
    fn extract_urls_respects_max_urls() {
        let fetcher = HttpUrlContextFetcher::new(Client::new());
        let messages = vec![ChatMessage::user(
            "https://a.com https://b.com https://c.com",
        )];
        let urls = fetcher.extract_urls(&messages, 2);
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn shadow_hosts_rewrites_hostname() {
        let fetcher = HttpUrlContextFetcher::new(Client::new());
        let mut shadow = HashMap::new();
        shadow.insert("old.example.com".to_string(), "new.example.com".to_string());
        let rewritten = fetcher.apply_shadow_hosts("https://old.example.com/page", &shadow);
        assert_eq!(rewritten, "https://new.example.com/page");
    }
}
