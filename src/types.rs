use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::{Result, SearchError};

/// Upper bound on results a single query may request
pub const MAX_RESULTS_LIMIT: usize = 50;

/// Identity tag carried by every provider instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Google,
    Brave,
    Searxng,
    DuckDuckGo,
}

impl ProviderId {
    /// Every known provider, in default priority order
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Google,
        ProviderId::Brave,
        ProviderId::Searxng,
        ProviderId::DuckDuckGo,
    ];

    /// Stable lowercase name used in keys, logs and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Google => "google",
            ProviderId::Brave => "brave",
            ProviderId::Searxng => "searxng",
            ProviderId::DuckDuckGo => "duckduckgo",
        }
    }

    /// Merge priority used when no override is configured (higher wins)
    pub fn default_priority(&self) -> u8 {
        match self {
            ProviderId::Google => 4,
            ProviderId::Brave => 3,
            ProviderId::Searxng => 2,
            ProviderId::DuckDuckGo => 1,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(ProviderId::Google),
            "brave" => Ok(ProviderId::Brave),
            "searxng" => Ok(ProviderId::Searxng),
            "duckduckgo" | "ddg" => Ok(ProviderId::DuckDuckGo),
            other => Err(SearchError::InvalidRequest(format!("Unknown provider: {}", other))),
        }
    }
}

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title
    pub title: String,
    /// Result URL, used as the dedup key
    pub url: String,
    /// Short description of the page
    pub snippet: String,
    /// Provider that produced the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        provider: ProviderId,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            provider: Some(provider),
        }
    }
}

/// Which providers a query should be dispatched to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProviderSelector {
    /// One named provider
    Single(ProviderId),
    /// A provider name this build does not know; served by the fallback list
    Unknown(String),
    /// Primary providers in order until enough results are collected
    Auto,
    /// Every configured provider concurrently
    All,
}

impl ProviderSelector {
    /// Label used in cache keys and monitoring
    pub fn label(&self) -> &str {
        match self {
            ProviderSelector::Single(id) => id.as_str(),
            ProviderSelector::Unknown(name) => name,
            ProviderSelector::Auto => "auto",
            ProviderSelector::All => "all",
        }
    }
}

impl Default for ProviderSelector {
    fn default() -> Self {
        ProviderSelector::Auto
    }
}

impl fmt::Display for ProviderSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ProviderSelector {
    type Err = SearchError;

    /// Never fails: unrecognised names become [`ProviderSelector::Unknown`]
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        let selector = match name.as_str() {
            "" | "auto" => ProviderSelector::Auto,
            "all" => ProviderSelector::All,
            other => match other.parse::<ProviderId>() {
                Ok(id) => ProviderSelector::Single(id),
                Err(_) => ProviderSelector::Unknown(other.to_string()),
            },
        };
        Ok(selector)
    }
}

/// Query submitted to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Query text
    pub text: String,
    /// Number of results wanted
    pub requested_count: usize,
    /// Provider selection policy
    pub selector: ProviderSelector,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, requested_count: usize, selector: ProviderSelector) -> Self {
        Self {
            text: text.into(),
            requested_count,
            selector,
        }
    }

    /// Parse a query from loosely typed caller input
    pub fn parse(text: &str, requested_count: usize, selector: &str) -> Result<Self> {
        let query = Self::new(text, requested_count, selector.parse()?);
        query.validate(MAX_RESULTS_LIMIT)?;
        Ok(query)
    }

    /// Reject malformed queries before any provider is touched
    pub fn validate(&self, max_results: usize) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(SearchError::InvalidRequest("Query cannot be empty".to_string()));
        }

        if self.requested_count == 0 || self.requested_count > max_results {
            return Err(SearchError::InvalidRequest(format!(
                "num_results must be between 1 and {}, got {}",
                max_results, self.requested_count
            )));
        }

        Ok(())
    }
}

/// Result of one orchestration call
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// At least one result was produced
    Success {
        results: Vec<SearchResult>,
        cached: bool,
    },
    /// Every selected provider failed or returned nothing
    Empty { message: String },
}

impl SearchOutcome {
    pub fn results(&self) -> &[SearchResult] {
        match self {
            SearchOutcome::Success { results, .. } => results,
            SearchOutcome::Empty { .. } => &[],
        }
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            SearchOutcome::Success { results, .. } => results,
            SearchOutcome::Empty { .. } => Vec::new(),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, SearchOutcome::Success { cached: true, .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            SearchOutcome::Success { .. } => None,
            SearchOutcome::Empty { message } => Some(message),
        }
    }
}

/// Wall clock in fractional epoch seconds, shared by both cache tiers
pub fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parsing() {
        assert_eq!("auto".parse::<ProviderSelector>().unwrap(), ProviderSelector::Auto);
        assert_eq!("ALL".parse::<ProviderSelector>().unwrap(), ProviderSelector::All);
        assert_eq!(
            "brave".parse::<ProviderSelector>().unwrap(),
            ProviderSelector::Single(ProviderId::Brave)
        );
        assert_eq!(
            " Bing ".parse::<ProviderSelector>().unwrap(),
            ProviderSelector::Unknown("bing".to_string())
        );
        assert_eq!(ProviderSelector::Unknown("bing".to_string()).label(), "bing");
    }

    #[test]
    fn test_default_priorities() {
        assert!(ProviderId::Google.default_priority() > ProviderId::Brave.default_priority());
        assert!(ProviderId::Brave.default_priority() > ProviderId::Searxng.default_priority());
        assert!(ProviderId::Searxng.default_priority() > ProviderId::DuckDuckGo.default_priority());
    }

    #[test]
    fn test_query_validation() {
        assert!(SearchQuery::parse("rust async", 10, "auto").is_ok());
        assert!(SearchQuery::parse("   ", 10, "auto").is_err());
        assert!(SearchQuery::parse("rust", 0, "auto").is_err());
        assert!(SearchQuery::parse("rust", MAX_RESULTS_LIMIT + 1, "auto").is_err());
    }

    #[test]
    fn test_search_result_serialization() {
        let result = SearchResult::new("Rust", "https://www.rust-lang.org", "A language", ProviderId::Brave);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["provider"], "brave");

        let bare: SearchResult =
            serde_json::from_str(r#"{"title":"t","url":"https://a.example","snippet":""}"#).unwrap();
        assert_eq!(bare.provider, None);
    }

    #[test]
    fn test_outcome_accessors() {
        let empty = SearchOutcome::Empty { message: "nothing".to_string() };
        assert!(empty.results().is_empty());
        assert_eq!(empty.message(), Some("nothing"));
        assert!(!empty.is_cached());
    }
}
