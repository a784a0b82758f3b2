//! Brave Web Search API provider

use super::{http, SearchProvider};
use crate::config::ProviderSettings;
use crate::error::{Result, SearchError};
use crate::types::{ProviderId, SearchResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave caps `count` at 20 per request
const MAX_COUNT: usize = 20;

pub struct BraveProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Debug, Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::build_client(timeout, None)?,
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn from_settings(settings: &ProviderSettings, timeout: Duration) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| SearchError::ProviderUnavailable("brave: API key not configured".to_string()))?;

        Ok(Self {
            client: http::build_client(timeout, settings.proxy.as_deref())?,
            api_key,
            endpoint: settings.endpoint.clone().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Brave
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        if self.api_key.is_empty() {
            return Err(SearchError::ProviderUnavailable("brave: API key not configured".to_string()));
        }

        info!("Sending request to Brave Search: {}", query);

        let count_param = count.min(MAX_COUNT).to_string();
        let request = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count_param.as_str())]);

        let response: BraveResponse = http::get_json(ProviderId::Brave, request).await?;
        let items = response.web.unwrap_or_default().results;
        info!("Brave Search successful, got {} results", items.len());

        Ok(items
            .into_iter()
            .take(count)
            .map(|item| SearchResult::new(item.title, item.url, item.description, ProviderId::Brave))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_for(server: &MockServer) -> BraveProvider {
        BraveProvider::new("test-token", Duration::from_secs(5))
            .unwrap()
            .with_endpoint(format!("{}/res/v1/web/search", server.uri()))
    }

    #[tokio::test]
    async fn test_parses_web_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Subscription-Token", "test-token"))
            .and(query_param("q", "rust"))
            .and(query_param("count", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "web": {
                    "results": [
                        {"title": "Rust", "url": "https://www.rust-lang.org/", "description": "A language"},
                        {"title": "Crates", "url": "https://crates.io/"}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let results = provider_for(&server).await.search("rust", 50).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Rust");
        assert_eq!(results[1].snippet, "");
        assert!(results.iter().all(|r| r.provider == Some(ProviderId::Brave)));
    }

    #[tokio::test]
    async fn test_missing_web_section_is_empty_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"type": "search"})))
            .mount(&server)
            .await;

        let results = provider_for(&server).await.search("nothing", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_auth_and_quota_failures_are_rejections() {
        for status in [401u16, 429] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let err = provider_for(&server).await.search("rust", 5).await.unwrap_err();
            assert!(matches!(err, SearchError::ProviderRejected(_)), "status {}: {:?}", status, err);
            assert!(!err.is_retryable());
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider_for(&server).await.search("rust", 5).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_key_is_unavailable() {
        let provider = BraveProvider::new("", Duration::from_secs(5)).unwrap();
        let err = provider.search("rust", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::ProviderUnavailable(_)));
    }
}
