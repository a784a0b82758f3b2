//! Google Custom Search JSON API provider

use super::{http, SearchProvider};
use crate::config::ProviderSettings;
use crate::error::{Result, SearchError};
use crate::types::{ProviderId, SearchResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// The API returns at most 10 items per page
const MAX_NUM: usize = 10;

pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl GoogleProvider {
    pub fn new(api_key: impl Into<String>, cse_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::build_client(timeout, None)?,
            api_key: api_key.into(),
            cse_id: cse_id.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn from_settings(settings: &ProviderSettings, timeout: Duration) -> Result<Self> {
        let (api_key, cse_id) = match (&settings.api_key, &settings.search_engine_id) {
            (Some(key), Some(cx)) => (key.clone(), cx.clone()),
            _ => {
                return Err(SearchError::ProviderUnavailable(
                    "google: API key and CSE id are both required".to_string(),
                ))
            }
        };

        // Only plain HTTP(S) proxies are supported
        let proxy = settings.proxy.as_deref().filter(|p| p.starts_with("http"));

        Ok(Self {
            client: http::build_client(timeout, proxy)?,
            api_key,
            cse_id,
            endpoint: settings.endpoint.clone().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for GoogleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        if self.api_key.is_empty() || self.cse_id.is_empty() {
            return Err(SearchError::ProviderUnavailable(
                "google: API key and CSE id are both required".to_string(),
            ));
        }

        info!("Sending request to Google Custom Search: {}", query);

        let num = count.min(MAX_NUM).to_string();
        let request = self.client.get(&self.endpoint).query(&[
            ("key", self.api_key.as_str()),
            ("cx", self.cse_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
        ]);

        let response: GoogleResponse = http::get_json(ProviderId::Google, request).await?;
        info!("Google search successful, got {} results", response.items.len());

        Ok(response
            .items
            .into_iter()
            .take(count)
            .map(|item| SearchResult::new(item.title, item.link, item.snippet, ProviderId::Google))
            .collect())
    }
}
