//! Search providers
//!
//! Every provider answers `search(query, count)` with either a (possibly
//! empty) list of results or a classified `SearchError`. Providers never
//! retry, rate-limit or cache on their own; the orchestrator layers those on.

pub mod brave;
pub mod duckduckgo;
pub mod google;
pub mod http;
pub mod searxng;

pub use brave::BraveProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use google::GoogleProvider;
pub use searxng::SearxngProvider;

use crate::config::ProvidersConfig;
use crate::error::Result;
use crate::types::{ProviderId, SearchResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A web search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Identity tag used for priorities, rate limits and metrics
    fn id(&self) -> ProviderId;

    /// Fetch up to `count` results for `query`
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchResult>>;
}

/// Shared provider handle
pub type ProviderHandle = Arc<dyn SearchProvider>;

/// The configured providers, split into the primary list (tried first in
/// auto mode) and the fallback list
#[derive(Clone, Default)]
pub struct ProviderSet {
    primary: Vec<ProviderHandle>,
    fallback: Vec<ProviderHandle>,
}

impl ProviderSet {
    pub fn new(primary: Vec<ProviderHandle>, fallback: Vec<ProviderHandle>) -> Self {
        Self { primary, fallback }
    }

    /// Build providers from configuration.
    ///
    /// DuckDuckGo always backs the fallback list. Brave, Google and SearXNG
    /// join the primary list in that order when usable; Google and SearXNG
    /// also join the fallback list. With no usable primary provider,
    /// DuckDuckGo becomes the primary.
    pub fn from_config(config: &ProvidersConfig, timeout: Duration) -> Result<Self> {
        let mut primary: Vec<ProviderHandle> = Vec::new();
        let mut fallback: Vec<ProviderHandle> = Vec::new();

        let duckduckgo: Option<ProviderHandle> = match config.usable(ProviderId::DuckDuckGo) {
            Some(settings) => Some(Arc::new(DuckDuckGoProvider::from_settings(settings, timeout)?) as ProviderHandle),
            None => None,
        };
        if let Some(ref ddg) = duckduckgo {
            fallback.push(ddg.clone());
        }

        if let Some(settings) = config.usable(ProviderId::Brave) {
            primary.push(Arc::new(BraveProvider::from_settings(settings, timeout)?));
            info!("Brave Search provider initialized");
        }

        if let Some(settings) = config.usable(ProviderId::Google) {
            let google: ProviderHandle = Arc::new(GoogleProvider::from_settings(settings, timeout)?);
            primary.push(google.clone());
            fallback.push(google);
            info!("Google search provider initialized");
        }

        if let Some(settings) = config.usable(ProviderId::Searxng) {
            let searxng = SearxngProvider::from_settings(settings, timeout)?;
            info!("SearXNG search provider initialized: {}", searxng.base_url());
            let searxng: ProviderHandle = Arc::new(searxng);
            primary.push(searxng.clone());
            fallback.push(searxng);
        }

        if primary.is_empty() {
            match duckduckgo {
                Some(ddg) => {
                    info!("No providers configured, using DuckDuckGo as default");
                    primary.push(ddg);
                }
                None => warn!("No search providers are enabled"),
            }
        }

        Ok(Self { primary, fallback })
    }

    pub fn primary(&self) -> &[ProviderHandle] {
        &self.primary
    }

    pub fn fallback(&self) -> &[ProviderHandle] {
        &self.fallback
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.fallback.is_empty()
    }

    /// First configured provider with the given identity
    pub fn find(&self, id: ProviderId) -> Option<ProviderHandle> {
        self.primary
            .iter()
            .chain(self.fallback.iter())
            .find(|p| p.id() == id)
            .cloned()
    }

    /// Primary then fallback providers, each identity once
    pub fn all_unique(&self) -> Vec<ProviderHandle> {
        let mut seen = Vec::new();
        let mut unique = Vec::new();

        for provider in self.primary.iter().chain(self.fallback.iter()) {
            let id = provider.id();
            if !seen.contains(&id) {
                seen.push(id);
                unique.push(provider.clone());
            }
        }

        unique
    }

    pub fn primary_ids(&self) -> Vec<ProviderId> {
        self.primary.iter().map(|p| p.id()).collect()
    }

    pub fn fallback_ids(&self) -> Vec<ProviderId> {
        self.fallback.iter().map(|p| p.id()).collect()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("primary", &self.primary_ids())
            .field("fallback", &self.fallback_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(keys: &[(ProviderId, &str)]) -> ProvidersConfig {
        let mut config = ProvidersConfig::default();
        for (id, value) in keys {
            let settings = config.get_mut(*id);
            match id {
                ProviderId::Google => {
                    settings.api_key = Some(value.to_string());
                    settings.search_engine_id = Some("cx".to_string());
                }
                ProviderId::Brave => settings.api_key = Some(value.to_string()),
                ProviderId::Searxng => settings.endpoint = Some(value.to_string()),
                ProviderId::DuckDuckGo => {}
            }
        }
        config
    }

    #[test]
    fn test_duckduckgo_only_by_default() {
        let set = ProviderSet::from_config(&ProvidersConfig::default(), Duration::from_secs(5)).unwrap();
        assert_eq!(set.primary_ids(), vec![ProviderId::DuckDuckGo]);
        assert_eq!(set.fallback_ids(), vec![ProviderId::DuckDuckGo]);
        assert_eq!(set.all_unique().len(), 1);
    }

    #[test]
    fn test_list_composition_with_all_providers() {
        let config = config_with(&[
            (ProviderId::Google, "g-key"),
            (ProviderId::Brave, "b-key"),
            (ProviderId::Searxng, "http://localhost:8888"),
        ]);
        let set = ProviderSet::from_config(&config, Duration::from_secs(5)).unwrap();

        assert_eq!(
            set.primary_ids(),
            vec![ProviderId::Brave, ProviderId::Google, ProviderId::Searxng]
        );
        assert_eq!(
            set.fallback_ids(),
            vec![ProviderId::DuckDuckGo, ProviderId::Google, ProviderId::Searxng]
        );

        let unique: Vec<_> = set.all_unique().iter().map(|p| p.id()).collect();
        assert_eq!(
            unique,
            vec![ProviderId::Brave, ProviderId::Google, ProviderId::Searxng, ProviderId::DuckDuckGo]
        );
        assert!(set.find(ProviderId::DuckDuckGo).is_some());
    }

    #[test]
    fn test_no_providers_when_everything_disabled() {
        let mut config = ProvidersConfig::default();
        config.get_mut(ProviderId::DuckDuckGo).enabled = false;

        let set = ProviderSet::from_config(&config, Duration::from_secs(5)).unwrap();
        assert!(set.is_empty());
        assert!(set.find(ProviderId::DuckDuckGo).is_none());
    }
}
