//! DuckDuckGo provider backed by the HTML-only endpoint
//!
//! Needs no credentials, which makes it the default fallback.

use super::{http, SearchProvider};
use crate::config::ProviderSettings;
use crate::error::{Result, SearchError};
use crate::types::{ProviderId, SearchResult};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

pub struct DuckDuckGoProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::build_client(timeout, None)?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn from_settings(settings: &ProviderSettings, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http::build_client(timeout, settings.proxy.as_deref())?,
            endpoint: settings.endpoint.clone().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::DuckDuckGo
    }

    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>> {
        info!("Sending request to DuckDuckGo: {}", query);

        let request = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query)])
            .header("Accept-Language", "en-US,en;q=0.9");

        let html = http::send(ProviderId::DuckDuckGo, request)
            .await?
            .text()
            .await
            .map_err(|e| http::map_request_error(ProviderId::DuckDuckGo, e))?;

        let results = parse_results(&html, count)?;
        info!("DuckDuckGo search successful, got {} results", results.len());
        Ok(results)
    }
}

/// Unwrap DuckDuckGo's `/l/?uddg=` redirect links into the target URL
fn extract_url(href: &str) -> Option<String> {
    let full_href = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&full_href).ok()?;

    if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else {
        Some(full_href)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("duckduckgo: invalid selector {}: {:?}", css, e)))
}

/// Extract organic results from the HTML results page, skipping ads
pub(crate) fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchResult>> {
    let document = Html::parse_document(html);

    let result_sel = selector(".result.results_links:not(.result--ad), .web-result:not(.result--ad)")?;
    let title_sel = selector(".result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut results = Vec::new();

    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };

        let title = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let Some(url) = title_el.value().attr("href").and_then(extract_url) else {
            continue;
        };

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        results.push(SearchResult::new(title, url, snippet, ProviderId::DuckDuckGo));

        if results.len() >= max_results {
            break;
        }
    }

    debug!(count = results.len(), "DuckDuckGo results parsed");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULTS_PAGE: &str = r#"
        <html><body>
          <div class="result results_links results_links_deep result--ad">
            <a class="result__a" href="https://ads.example/">Sponsored</a>
          </div>
          <div class="result results_links results_links_deep web-result">
            <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdoc.rust-lang.org%2Fbook%2F&rut=abc">The Rust Book</a></h2>
            <a class="result__snippet">Learn Rust from the ground up.</a>
          </div>
          <div class="result results_links results_links_deep web-result">
            <h2><a class="result__a" href="https://tokio.rs/">Tokio</a></h2>
          </div>
          <div class="result results_links web-result">
            <h2><a class="result__a" href="https://serde.rs/">   </a></h2>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_skips_ads_and_unwraps_redirects() {
        let results = parse_results(RESULTS_PAGE, 10).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "The Rust Book");
        assert_eq!(results[0].url, "https://doc.rust-lang.org/book/");
        assert_eq!(results[0].snippet, "Learn Rust from the ground up.");
        assert_eq!(results[1].url, "https://tokio.rs/");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_parse_respects_max_results() {
        assert_eq!(parse_results(RESULTS_PAGE, 1).unwrap().len(), 1);
        assert!(parse_results("<html></html>", 5).unwrap().is_empty());
    }

    #[test]
    fn test_extract_url() {
        assert_eq!(
            extract_url("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa"),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(extract_url("https://example.com/"), Some("https://example.com/".to_string()));
        assert_eq!(extract_url("not a url"), None);
    }

    #[tokio::test]
    async fn test_search_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("q=rust+book"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS_PAGE))
            .mount(&server)
            .await;

        let provider = DuckDuckGoProvider::new(Duration::from_secs(5))
            .unwrap()
            .with_endpoint(server.uri());

        let results = provider.search("rust book", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.provider == Some(ProviderId::DuckDuckGo)));
    }
}
