use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;
use crate::error::{Result, SearchError};

/// Prometheus metrics registry and collectors
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

/// All aggregator metrics
pub struct Metrics {
    // Orchestration metrics
    pub search_total: Counter,
    pub search_empty_total: Counter,
    pub search_duration_seconds: Histogram,
    pub inflight_searches: Gauge,

    // Cache metrics
    pub cache_hits_total: Counter,
    pub cache_misses_total: Counter,

    // Provider metrics, labelled by provider
    pub provider_requests_total: CounterVec,
    pub provider_failures_total: CounterVec,
    pub provider_duration_seconds: HistogramVec,
    pub rate_limit_wait_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all collectors
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(&registry)?);

        Ok(Self { registry, metrics })
    }

    /// Get metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SearchError::Internal(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| SearchError::Internal(format!("Failed to convert metrics to string: {}", e)))
    }

    /// Get the underlying registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

fn register<C>(registry: &Registry, collector: &C, name: &str) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| SearchError::Internal(format!("Failed to register {}: {}", name, e)))
}

fn metric_error(name: &str) -> impl FnOnce(prometheus::Error) -> SearchError + '_ {
    move |e| SearchError::Internal(format!("Failed to create {} metric: {}", name, e))
}

impl Metrics {
    fn new(registry: &Registry) -> Result<Self> {
        let search_total = Counter::new("search_total", "Total number of orchestrated searches")
            .map_err(metric_error("search_total"))?;

        let search_empty_total = Counter::new(
            "search_empty_total",
            "Searches where every selected provider failed or returned nothing",
        )
        .map_err(metric_error("search_empty_total"))?;

        let search_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("search_duration_seconds", "End-to-end search duration in seconds")
                .buckets(vec![0.005, 0.025, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )
        .map_err(metric_error("search_duration_seconds"))?;

        let inflight_searches = Gauge::new("inflight_searches", "Searches currently being processed")
            .map_err(metric_error("inflight_searches"))?;

        let cache_hits_total = Counter::new("cache_hits_total", "Total number of result cache hits")
            .map_err(metric_error("cache_hits_total"))?;

        let cache_misses_total = Counter::new("cache_misses_total", "Total number of result cache misses")
            .map_err(metric_error("cache_misses_total"))?;

        let provider_requests_total = CounterVec::new(
            Opts::new("provider_requests_total", "Dispatches to each search provider"),
            &["provider"],
        )
        .map_err(metric_error("provider_requests_total"))?;

        let provider_failures_total = CounterVec::new(
            Opts::new("provider_failures_total", "Failed dispatches by provider and error type"),
            &["provider", "error_type"],
        )
        .map_err(metric_error("provider_failures_total"))?;

        let provider_duration_seconds = HistogramVec::new(
            HistogramOpts::new("provider_duration_seconds", "Provider call duration in seconds, retries included")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["provider"],
        )
        .map_err(metric_error("provider_duration_seconds"))?;

        let rate_limit_wait_seconds = HistogramVec::new(
            HistogramOpts::new("rate_limit_wait_seconds", "Time spent waiting for provider tokens")
                .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0]),
            &["provider"],
        )
        .map_err(metric_error("rate_limit_wait_seconds"))?;

        register(registry, &search_total, "search_total")?;
        register(registry, &search_empty_total, "search_empty_total")?;
        register(registry, &search_duration_seconds, "search_duration_seconds")?;
        register(registry, &inflight_searches, "inflight_searches")?;
        register(registry, &cache_hits_total, "cache_hits_total")?;
        register(registry, &cache_misses_total, "cache_misses_total")?;
        register(registry, &provider_requests_total, "provider_requests_total")?;
        register(registry, &provider_failures_total, "provider_failures_total")?;
        register(registry, &provider_duration_seconds, "provider_duration_seconds")?;
        register(registry, &rate_limit_wait_seconds, "rate_limit_wait_seconds")?;

        Ok(Self {
            search_total,
            search_empty_total,
            search_duration_seconds,
            inflight_searches,
            cache_hits_total,
            cache_misses_total,
            provider_requests_total,
            provider_failures_total,
            provider_duration_seconds,
            rate_limit_wait_seconds,
        })
    }
}

/// Timer helper for measuring durations
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    pub fn observe(self) {
        let duration = self.start.elapsed();
        self.histogram.observe(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registry_creation() {
        let registry = MetricsRegistry::new().unwrap();
        assert!(registry.gather().is_ok());
    }

    #[test]
    fn test_metrics_collection() {
        let registry = MetricsRegistry::new().unwrap();

        registry.metrics.search_total.inc();
        registry.metrics.cache_hits_total.inc();
        registry.metrics.inflight_searches.set(2.0);
        registry.metrics.provider_requests_total.with_label_values(&["brave"]).inc();
        registry
            .metrics
            .provider_failures_total
            .with_label_values(&["google", "provider_rejected"])
            .inc();

        let output = registry.gather().unwrap();
        assert!(output.contains("search_total"));
        assert!(output.contains("cache_hits_total"));
        assert!(output.contains("inflight_searches"));
        assert!(output.contains("provider=\"brave\""));
        assert!(output.contains("error_type=\"provider_rejected\""));
    }

    #[test]
    fn test_timer_functionality() {
        let registry = MetricsRegistry::new().unwrap();
        let timer = Timer::new(registry.metrics.search_duration_seconds.clone());

        std::thread::sleep(std::time::Duration::from_millis(1));
        timer.observe();

        assert_eq!(registry.metrics.search_duration_seconds.get_sample_count(), 1);
    }
}
