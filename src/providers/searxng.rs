//! Self-hosted SearXNG instance provider

use super::{http, SearchProvider};
use crate::config::ProviderSettings;
use crate::error::{Result, SearchError};
use crate::types::{ProviderId, SearchResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_LANGUAGE: &str = "zh-CN";

pub struct SearxngProvider {
    client: reqwest::Client,
    base_url: String,
    language: String,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngItem>,
}

#[derive(Debug, Deserialize)]
struct SearxngItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl SearxngProvider {
    pub fn new(base_url: &str, language: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::build_client(timeout, None)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.into(),
        })
    }

    pub fn from_settings(settings: &ProviderSettings, timeout: Duration) -> Result<Self> {
        let base_url = settings
            .endpoint
            .as_deref()
            .ok_or_else(|| SearchError::ProviderUnavailable("searxng: base URL not configured".to_string()))?;

        Ok(Self {
            client: http::build_client(timeout, settings.proxy.as_deref())?,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: settings.language.clone().unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SearchProvider for SearxngProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Searxng
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        let search_url = format!("{}/search", self.base_url);
        info!("Sending request to SearXNG: {} with query: {}", search_url, query);

        let request = self.client.get(&search_url).query(&[
            ("q", query),
            ("format", "json"),
            ("language", self.language.as_str()),
            ("pageno", "1"),
        ]);

        let response: SearxngResponse = http::get_json(ProviderId::Searxng, request).await?;
        info!("SearXNG search successful, got {} results", response.results.len());

        Ok(response
            .results
            .into_iter()
            .take(count)
            .map(|item| SearchResult::new(item.title, item.url, item.content, ProviderId::Searxng))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_queries_json_format_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("format", "json"))
            .and(query_param("language", "en"))
            .and(query_param("pageno", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"title": "One", "url": "https://one.example/", "content": "first"},
                    {"title": "Two", "url": "https://two.example/", "content": "second"},
                    {"title": "Three", "url": "https://three.example/", "content": "third"}
                ]
            })))
            .mount(&server)
            .await;

        let base = format!("{}/", server.uri());
        let provider = SearxngProvider::new(&base, "en", Duration::from_secs(5)).unwrap();
        assert_eq!(provider.base_url(), server.uri());

        let results = provider.search("example", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].snippet, "second");
    }

    #[tokio::test]
    async fn test_unreachable_instance_is_transient() {
        // Nothing listens on port 9 locally
        let provider = SearxngProvider::new("http://127.0.0.1:9", "en", Duration::from_secs(2)).unwrap();
        let err = provider.search("example", 2).await.unwrap_err();
        assert!(err.is_retryable(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_garbled_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let provider = SearxngProvider::new(&server.uri(), "en", Duration::from_secs(5)).unwrap();
        assert!(matches!(provider.search("x", 2).await, Err(SearchError::Parse(_))));
    }
}
