//! Search orchestration
//!
//! Validates the query, consults the cache, dispatches to providers
//! according to the selector and merges what comes back. Every provider
//! call goes through the rate limiter, a per-call timeout and the retry
//! executor. Provider faults are contained here; only a malformed query
//! reaches the caller as an error.

use crate::cache::CacheManager;
use crate::config::Config;
use crate::error::{Result, SearchError};
use crate::observability::monitor::{PerformanceMonitor, ProviderCall, SearchMetrics};
use crate::observability::{LoggingService, MetricsRegistry, Timer};
use crate::providers::{ProviderSet, SearchProvider};
use crate::search::merger::ResultMerger;
use crate::search::rate_limiter::RateLimiterRegistry;
use crate::search::retry::RetryExecutor;
use crate::types::{ProviderId, ProviderSelector, SearchOutcome, SearchQuery, SearchResult, MAX_RESULTS_LIMIT};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Default per-call provider timeout
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of a cache warmup run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    pub total: usize,
    pub success: usize,
    pub cached: usize,
    pub failed: usize,
}

/// Per-provider contributions collected for one query
type Contributions = Vec<(ProviderId, Vec<SearchResult>)>;

pub struct SearchOrchestrator {
    providers: ProviderSet,
    cache: Arc<CacheManager>,
    rate_limiter: Arc<RateLimiterRegistry>,
    retry: RetryExecutor,
    merger: ResultMerger,
    monitor: Arc<PerformanceMonitor>,
    metrics: Option<Arc<MetricsRegistry>>,
    logger: LoggingService,
    provider_timeout: Duration,
    max_results: usize,
}

impl SearchOrchestrator {
    /// An orchestrator with no cache, no rate limits and default retries
    pub fn new(providers: ProviderSet) -> Self {
        Self {
            providers,
            cache: Arc::new(CacheManager::disabled()),
            rate_limiter: Arc::new(RateLimiterRegistry::unlimited()),
            retry: RetryExecutor::default(),
            merger: ResultMerger::default(),
            monitor: Arc::new(PerformanceMonitor::default()),
            metrics: None,
            logger: LoggingService::new(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            max_results: MAX_RESULTS_LIMIT,
        }
    }

    /// Wire up providers, cache, rate limits and retries from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let providers = ProviderSet::from_config(&config.providers, config.search.provider_timeout)?;
        info!("Search orchestrator providers: {:?}", providers);

        Ok(Self::new(providers)
            .with_cache(Arc::new(CacheManager::from_config(&config.cache)))
            .with_rate_limiter(Arc::new(RateLimiterRegistry::new(config.providers.rate_limits())))
            .with_retry(RetryExecutor::with_config(config.retry.clone()))
            .with_merger(ResultMerger::new(config.providers.priorities()))
            .with_monitor(Arc::new(PerformanceMonitor::new(config.monitor.recent_capacity)))
            .with_provider_timeout(config.search.provider_timeout)
            .with_max_results(config.search.max_results))
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiterRegistry>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_merger(mut self, merger: ResultMerger) -> Self {
        self.merger = merger;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiterRegistry> {
        &self.rate_limiter
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Run one query end to end.
    ///
    /// Returns `Err` only for a malformed query. Provider failures degrade to
    /// fewer results, and to [`SearchOutcome::Empty`] when nothing came back.
    #[instrument(skip(self, query), fields(
        query_len = query.text.len(),
        count = query.requested_count,
        selector = %query.selector
    ))]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome> {
        query.validate(self.max_results)?;

        let start_time = Utc::now();
        let timer = self.metrics.as_ref().map(|metrics| {
            metrics.metrics.inflight_searches.inc();
            Timer::new(metrics.metrics.search_duration_seconds.clone())
        });

        let outcome = self.run(query).await;

        let search_metrics = SearchMetrics {
            query: query.text.clone(),
            selector: query.selector.label().to_string(),
            start_time,
            end_time: Utc::now(),
            success: matches!(outcome, SearchOutcome::Success { .. }),
            cached: outcome.is_cached(),
            result_count: outcome.results().len(),
            error: outcome.message().map(str::to_string),
        };
        self.logger.log_search(&search_metrics);
        self.monitor.record_search(search_metrics);

        if let Some(metrics) = &self.metrics {
            let metrics = &metrics.metrics;
            metrics.inflight_searches.dec();
            metrics.search_total.inc();
            if outcome.message().is_some() {
                metrics.search_empty_total.inc();
            }
        }

        if let Some(timer) = timer {
            timer.observe();
        }

        Ok(outcome)
    }

    async fn run(&self, query: &SearchQuery) -> SearchOutcome {
        if self.cache.is_enabled() {
            let cached = self.cache.get(query).await;
            if let Some(metrics) = &self.metrics {
                match cached {
                    Some(_) => metrics.metrics.cache_hits_total.inc(),
                    None => metrics.metrics.cache_misses_total.inc(),
                }
            }
            if let Some(results) = cached {
                debug!("Returning {} cached results", results.len());
                return SearchOutcome::Success { results, cached: true };
            }
        }

        if self.providers.is_empty() {
            warn!("Search requested but no providers are configured");
            return SearchOutcome::Empty {
                message: "No search providers are configured".to_string(),
            };
        }

        let (contributions, attempted) = match &query.selector {
            ProviderSelector::Single(id) => self.search_single(*id, query).await,
            ProviderSelector::Unknown(name) => {
                warn!("Requested provider {} is not available, using fallback providers", name);
                self.search_fallback(query).await
            }
            ProviderSelector::Auto => self.search_auto(query).await,
            ProviderSelector::All => self.search_all(query).await,
        };

        let results = self.merger.merge(&contributions, query.requested_count);
        if results.is_empty() {
            let failed = attempted - contributions.len();
            return SearchOutcome::Empty {
                message: format!(
                    "No results found for \"{}\" (engine: {}, {} of {} providers failed)",
                    query.text,
                    query.selector.label(),
                    failed,
                    attempted
                ),
            };
        }

        info!(
            "Merged {} results from {} providers",
            results.len(),
            contributions.len()
        );
        self.cache.set(query, &results).await;
        SearchOutcome::Success { results, cached: false }
    }

    /// One named provider, or the fallback list when it is not configured
    async fn search_single(&self, id: ProviderId, query: &SearchQuery) -> (Contributions, usize) {
        if let Some(provider) = self.providers.find(id) {
            let outcome = self.dispatch(provider.as_ref(), &query.text, query.requested_count).await;
            return (outcome.ok().map(|r| vec![(id, r)]).unwrap_or_default(), 1);
        }

        warn!("Provider {} is not configured, using fallback providers", id);
        self.search_fallback(query).await
    }

    /// Every fallback provider, serially
    async fn search_fallback(&self, query: &SearchQuery) -> (Contributions, usize) {
        let mut contributions = Vec::new();
        let fallback = self.providers.fallback();
        for provider in fallback {
            if let Ok(results) = self.dispatch(provider.as_ref(), &query.text, query.requested_count).await {
                contributions.push((provider.id(), results));
            }
        }
        (contributions, fallback.len())
    }

    /// Primary providers in order until enough results are collected
    async fn search_auto(&self, query: &SearchQuery) -> (Contributions, usize) {
        let providers = if self.providers.primary().is_empty() {
            self.providers.fallback()
        } else {
            self.providers.primary()
        };

        let mut contributions = Vec::new();
        let mut collected = 0;
        let mut attempted = 0;

        for provider in providers {
            attempted += 1;
            match self.dispatch(provider.as_ref(), &query.text, query.requested_count).await {
                Ok(results) => {
                    collected += results.len();
                    contributions.push((provider.id(), results));
                    if collected >= query.requested_count {
                        debug!("Collected {} results, skipping remaining providers", collected);
                        break;
                    }
                }
                Err(_) => continue,
            }
        }

        (contributions, attempted)
    }

    /// Every configured provider concurrently, collected in dispatch order
    async fn search_all(&self, query: &SearchQuery) -> (Contributions, usize) {
        let providers = self.providers.all_unique();
        let calls = providers.iter().map(|provider| {
            let provider = provider.as_ref();
            async move {
                let outcome = self.dispatch(provider, &query.text, query.requested_count).await;
                (provider.id(), outcome)
            }
        });

        let outcomes = join_all(calls).await;
        let contributions = outcomes
            .into_iter()
            .filter_map(|(id, outcome)| outcome.ok().map(|results| (id, results)))
            .collect();

        (contributions, providers.len())
    }

    /// One rate-limited, timed and retried provider call
    async fn dispatch(&self, provider: &dyn SearchProvider, text: &str, count: usize) -> Result<Vec<SearchResult>> {
        let id = provider.id();
        let waited = match self.rate_limiter.acquire(id, 1).await {
            Ok(waited) => waited,
            Err(e) => {
                error!("{} rate limiter refused the call: {}", id, e);
                return Err(e);
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .metrics
                .rate_limit_wait_seconds
                .with_label_values(&[id.as_str()])
                .observe(waited.as_secs_f64());
            metrics.metrics.provider_requests_total.with_label_values(&[id.as_str()]).inc();
        }

        let timeout = self.provider_timeout;
        let label = format!("{} search", id);
        let started = Instant::now();

        let outcome = self
            .retry
            .execute_labeled(&label, || async move {
                match tokio::time::timeout(timeout, provider.search(text, count)).await {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout(format!(
                        "{}: no response within {}s",
                        id,
                        timeout.as_secs_f64()
                    ))),
                }
            })
            .await;

        let duration = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics
                .metrics
                .provider_duration_seconds
                .with_label_values(&[id.as_str()])
                .observe(duration.as_secs_f64());
            if let Err(e) = &outcome {
                metrics
                    .metrics
                    .provider_failures_total
                    .with_label_values(&[id.as_str(), e.error_type()])
                    .inc();
            }
        }

        match &outcome {
            Ok(results) => debug!("{} returned {} results in {:?}", id, results.len(), duration),
            Err(e @ (SearchError::ProviderUnavailable(_) | SearchError::ProviderRejected(_))) => {
                warn!("{} skipped: {}", id, e)
            }
            // exhausted transient errors were already reported by the retry executor
            Err(e) if e.is_retryable() => {}
            Err(e) => error!("{} failed: {}", id, e),
        }

        self.monitor.record_provider_call(ProviderCall {
            provider: id,
            duration,
            result_count: outcome.as_ref().map(Vec::len).unwrap_or(0),
            error: outcome.as_ref().err().map(ToString::to_string),
        });

        outcome
    }

    /// Run each query once so its results land in the cache.
    ///
    /// Queries already cached are counted but not re-fetched.
    pub async fn warmup(&self, queries: &[SearchQuery]) -> WarmupReport {
        let mut report = WarmupReport {
            total: queries.len(),
            ..WarmupReport::default()
        };

        for query in queries {
            match self.search(query).await {
                Ok(SearchOutcome::Success { cached: true, .. }) => report.cached += 1,
                Ok(SearchOutcome::Success { cached: false, .. }) => report.success += 1,
                Ok(SearchOutcome::Empty { .. }) => report.failed += 1,
                Err(e) => {
                    warn!("Skipping warmup query: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Cache warmup finished: {} total, {} fetched, {} already cached, {} failed",
            report.total, report.success, report.cached, report.failed
        );
        report
    }
}
