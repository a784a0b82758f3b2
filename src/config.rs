use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{Result, SearchError};
use crate::observability::monitor::DEFAULT_RECENT_CAPACITY;
use crate::search::rate_limiter::RateLimitConfig;
use crate::search::retry::RetryConfig;
use crate::types::{ProviderId, MAX_RESULTS_LIMIT};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Orchestration settings
    pub search: SearchSettings,
    /// Result cache settings
    pub cache: CacheConfig,
    /// Backoff policy for provider calls
    pub retry: RetryConfig,
    /// Monitor settings
    pub monitor: MonitorConfig,
    /// Per-provider settings
    pub providers: ProvidersConfig,
}

/// Orchestration settings
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Deadline for a single provider call
    pub provider_timeout: Duration,
    /// Largest result count a query may request
    pub max_results: usize,
}

/// Which cache tier backs the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Persistent,
}

impl FromStr for CacheBackendKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "persistent" | "sqlite" => Ok(CacheBackendKind::Persistent),
            other => Err(SearchError::ConfigError(format!("Unknown cache backend: {}", other))),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether results are cached at all
    pub enabled: bool,
    /// Storage tier
    pub backend: CacheBackendKind,
    /// Entry lifetime
    pub ttl: Duration,
    /// Maximum number of entries
    pub max_size: usize,
    /// SQLite file for the persistent tier
    pub db_path: PathBuf,
    /// Keep hot persistent entries in memory as well
    pub memory_mirror: bool,
    /// Rows dropped at once when the persistent tier is full
    pub eviction_batch: usize,
}

impl CacheConfig {
    pub const DEFAULT_MEMORY_MAX_SIZE: usize = 1_000;
    pub const DEFAULT_PERSISTENT_MAX_SIZE: usize = 10_000;
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Memory,
            ttl: Duration::from_secs(3600), // 1 hour
            max_size: Self::DEFAULT_MEMORY_MAX_SIZE,
            db_path: PathBuf::from("cache/search_cache.db"),
            memory_mirror: true,
            eviction_batch: 100,
        }
    }
}

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Size of the recent-search ring buffer
    pub recent_capacity: usize,
}

/// Settings for a single provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    /// Google programmable search engine id (`cx`)
    pub search_engine_id: Option<String>,
    /// Base URL, required for self-hosted providers
    pub endpoint: Option<String>,
    pub language: Option<String>,
    pub proxy: Option<String>,
    pub rate_limit: RateLimitConfig,
    /// Merge priority, higher wins
    pub priority: u8,
}

impl ProviderSettings {
    pub fn defaults_for(provider: ProviderId) -> Self {
        Self {
            enabled: true,
            api_key: None,
            search_engine_id: None,
            endpoint: None,
            language: None,
            proxy: None,
            rate_limit: RateLimitConfig::default_for(provider),
            priority: provider.default_priority(),
        }
    }

    /// Whether the settings carry everything the provider needs to run
    pub fn is_usable(&self, provider: ProviderId) -> bool {
        if !self.enabled {
            return false;
        }

        match provider {
            ProviderId::Google => self.api_key.is_some() && self.search_engine_id.is_some(),
            ProviderId::Brave => self.api_key.is_some(),
            ProviderId::Searxng => self.endpoint.is_some(),
            ProviderId::DuckDuckGo => true,
        }
    }
}

/// Settings for every known provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProvidersConfig {
    settings: HashMap<ProviderId, ProviderSettings>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            settings: ProviderId::ALL
                .iter()
                .map(|id| (*id, ProviderSettings::defaults_for(*id)))
                .collect(),
        }
    }
}

impl ProvidersConfig {
    pub fn get(&self, provider: ProviderId) -> Option<&ProviderSettings> {
        self.settings.get(&provider)
    }

    pub fn get_mut(&mut self, provider: ProviderId) -> &mut ProviderSettings {
        self.settings
            .entry(provider)
            .or_insert_with(|| ProviderSettings::defaults_for(provider))
    }

    /// Providers whose settings are complete and enabled
    pub fn usable(&self, provider: ProviderId) -> Option<&ProviderSettings> {
        self.get(provider).filter(|s| s.is_usable(provider))
    }

    pub fn rate_limits(&self) -> HashMap<ProviderId, RateLimitConfig> {
        self.settings.iter().map(|(id, s)| (*id, s.rate_limit)).collect()
    }

    pub fn priorities(&self) -> HashMap<ProviderId, u8> {
        self.settings.iter().map(|(id, s)| (*id, s.priority)).collect()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("Could not load .env file: {}", e);
        }

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let backend: CacheBackendKind = vars.parse("CACHE_BACKEND", CacheBackendKind::Memory)?;
        let default_max_size = match backend {
            CacheBackendKind::Memory => CacheConfig::DEFAULT_MEMORY_MAX_SIZE,
            CacheBackendKind::Persistent => CacheConfig::DEFAULT_PERSISTENT_MAX_SIZE,
        };

        let mut providers = ProvidersConfig::default();
        for id in ProviderId::ALL {
            let prefix = id.as_str().to_ascii_uppercase();
            let defaults = ProviderSettings::defaults_for(id);
            let settings = providers.get_mut(id);

            settings.enabled = vars.parse(&format!("{}_ENABLED", prefix), true)?;
            settings.proxy = vars.optional(&format!("{}_PROXY", prefix));
            settings.priority = vars.parse(&format!("{}_PRIORITY", prefix), defaults.priority)?;
            settings.rate_limit = RateLimitConfig::new(
                vars.parse(
                    &format!("{}_RATE_LIMIT_MAX_REQUESTS", prefix),
                    defaults.rate_limit.max_requests,
                )?,
                Duration::from_secs(vars.parse(
                    &format!("{}_RATE_LIMIT_WINDOW_SECS", prefix),
                    defaults.rate_limit.time_window.as_secs(),
                )?),
            );
        }

        {
            let google = providers.get_mut(ProviderId::Google);
            google.api_key = vars.optional("GOOGLE_API_KEY");
            google.search_engine_id = vars.optional("GOOGLE_CSE_ID");
            if google.proxy.is_none() {
                google.proxy = vars.optional("HTTPS_PROXY").or_else(|| vars.optional("HTTP_PROXY"));
            }
        }

        providers.get_mut(ProviderId::Brave).api_key = vars.optional("BRAVE_API_KEY");

        {
            let searxng = providers.get_mut(ProviderId::Searxng);
            searxng.endpoint = vars.optional("SEARXNG_BASE_URL");
            searxng.language = Some(vars.optional("SEARXNG_LANGUAGE").unwrap_or_else(|| "zh-CN".to_string()));
        }

        let config = Config {
            search: SearchSettings {
                provider_timeout: Duration::from_secs(vars.parse("SEARCH_PROVIDER_TIMEOUT_SECS", 30)?),
                max_results: vars.parse("SEARCH_MAX_RESULTS", MAX_RESULTS_LIMIT)?,
            },
            cache: CacheConfig {
                enabled: vars.parse("CACHE_ENABLED", true)?,
                backend,
                ttl: Duration::from_secs(vars.parse("CACHE_TTL_SECS", 3600)?),
                max_size: vars.parse("CACHE_MAX_SIZE", default_max_size)?,
                db_path: PathBuf::from(
                    vars.optional("CACHE_DB_PATH").unwrap_or_else(|| "cache/search_cache.db".to_string()),
                ),
                memory_mirror: vars.parse("CACHE_MEMORY_MIRROR", true)?,
                eviction_batch: vars.parse("CACHE_EVICTION_BATCH", 100)?,
            },
            retry: RetryConfig {
                max_attempts: vars.parse("RETRY_MAX_ATTEMPTS", 3)?,
                initial_delay: Duration::from_millis(vars.parse("RETRY_INITIAL_DELAY_MS", 1000)?),
                max_delay: Duration::from_millis(vars.parse("RETRY_MAX_DELAY_MS", 60_000)?),
                exponential_base: vars.parse("RETRY_EXPONENTIAL_BASE", 2.0)?,
                jitter_factor: vars.parse("RETRY_JITTER_FACTOR", 0.0)?,
            },
            monitor: MonitorConfig {
                recent_capacity: vars.parse("MONITOR_RECENT_CAPACITY", DEFAULT_RECENT_CAPACITY)?,
            },
            providers,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.search.provider_timeout.is_zero() {
            return Err(SearchError::ConfigError("Provider timeout must be greater than 0".to_string()));
        }

        if self.search.max_results == 0 {
            return Err(SearchError::ConfigError("Max results must be greater than 0".to_string()));
        }

        if self.cache.max_size == 0 {
            return Err(SearchError::ConfigError("Cache max size must be greater than 0".to_string()));
        }

        if self.cache.eviction_batch == 0 {
            return Err(SearchError::ConfigError("Cache eviction batch must be greater than 0".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(SearchError::ConfigError("Retry attempts must be at least 1".to_string()));
        }

        if self.retry.exponential_base < 1.0 {
            return Err(SearchError::ConfigError("Retry exponential base must be >= 1.0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(SearchError::ConfigError("Retry jitter factor must be within 0.0..=1.0".to_string()));
        }

        for id in ProviderId::ALL {
            if let Some(settings) = self.providers.get(id) {
                if settings.rate_limit.max_requests == 0 || settings.rate_limit.time_window.is_zero() {
                    return Err(SearchError::ConfigError(format!(
                        "Rate limit for {} must allow at least one request per non-zero window",
                        id
                    )));
                }

                if let Some(ref endpoint) = settings.endpoint {
                    url::Url::parse(endpoint).map_err(|e| {
                        SearchError::ConfigError(format!("Invalid endpoint for {}: {}", id, e))
                    })?;
                }
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            search: SearchSettings {
                provider_timeout: Duration::from_secs(30),
                max_results: MAX_RESULTS_LIMIT,
            },
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            monitor: MonitorConfig {
                recent_capacity: DEFAULT_RECENT_CAPACITY,
            },
            providers: ProvidersConfig::default(),
        }
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Non-empty value of `name`
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e| SearchError::ConfigError(format!("Invalid {}: {}", name, e))),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_only_enable_duckduckgo() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert!(config.providers.usable(ProviderId::DuckDuckGo).is_some());
        assert!(config.providers.usable(ProviderId::Google).is_none());
        assert!(config.providers.usable(ProviderId::Brave).is_none());
        assert!(config.providers.usable(ProviderId::Searxng).is_none());
        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.cache.max_size, 1_000);
        assert_eq!(config.search.provider_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_google_requires_both_credentials() {
        let config = Config::from_lookup(lookup(&[("GOOGLE_API_KEY", "key")])).unwrap();
        assert!(config.providers.usable(ProviderId::Google).is_none());

        let config = Config::from_lookup(lookup(&[("GOOGLE_API_KEY", "key"), ("GOOGLE_CSE_ID", "cx")])).unwrap();
        assert!(config.providers.usable(ProviderId::Google).is_some());
    }

    #[test]
    fn test_disabled_provider_is_not_usable() {
        let config = Config::from_lookup(lookup(&[("BRAVE_API_KEY", "token"), ("BRAVE_ENABLED", "false")])).unwrap();
        assert!(config.providers.usable(ProviderId::Brave).is_none());
    }

    #[test]
    fn test_persistent_backend_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("CACHE_BACKEND", "persistent"),
            ("CACHE_DB_PATH", "/tmp/search.db"),
        ]))
        .unwrap();

        assert_eq!(config.cache.backend, CacheBackendKind::Persistent);
        assert_eq!(config.cache.max_size, 10_000);
        assert_eq!(config.cache.db_path, PathBuf::from("/tmp/search.db"));
    }

    #[test]
    fn test_rate_limit_and_priority_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SEARXNG_BASE_URL", "http://localhost:8888"),
            ("SEARXNG_RATE_LIMIT_MAX_REQUESTS", "10"),
            ("SEARXNG_RATE_LIMIT_WINDOW_SECS", "1"),
            ("SEARXNG_PRIORITY", "9"),
        ]))
        .unwrap();

        let searxng = config.providers.usable(ProviderId::Searxng).unwrap();
        assert_eq!(searxng.rate_limit, RateLimitConfig::new(10, Duration::from_secs(1)));
        assert_eq!(searxng.priority, 9);
        assert_eq!(searxng.language.as_deref(), Some("zh-CN"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("CACHE_TTL_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CACHE_BACKEND", "redis")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RETRY_MAX_ATTEMPTS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SEARXNG_BASE_URL", "not a url")])).is_err());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }
}
