use super::*;
use crate::cache::{CacheManager, MemoryCache};
use crate::error::SearchError;
use crate::providers::{ProviderHandle, ProviderSet, SearchProvider};
use crate::search::SearchOrchestrator;
use crate::types::{ProviderId, SearchResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Provider that answers every query with nothing
struct SilentProvider(ProviderId);

#[async_trait]
impl SearchProvider for SilentProvider {
    fn id(&self) -> ProviderId {
        self.0
    }

    async fn search(&self, _query: &str, _count: usize) -> crate::error::Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }
}

fn provider(id: ProviderId) -> ProviderHandle {
    Arc::new(SilentProvider(id))
}

fn failed_search(n: usize) -> SearchMetrics {
    let now = Utc::now();
    SearchMetrics {
        query: format!("query {}", n),
        selector: "auto".to_string(),
        start_time: now,
        end_time: now,
        success: false,
        cached: false,
        result_count: 0,
        error: Some("No results".to_string()),
    }
}

#[test]
fn test_observability_service_initialization() {
    let observability = ObservabilityService::new();
    assert!(observability.is_ok());

    let obs = observability.unwrap();
    assert_eq!(obs.logging.service_name(), "web-search-aggregator");
    assert!(obs.metrics.gather().is_ok());
}

#[tokio::test]
async fn test_timer_functionality() {
    let registry = MetricsRegistry::new().unwrap();

    let timer = Timer::new(registry.metrics.search_duration_seconds.clone());
    sleep(Duration::from_millis(10)).await;
    timer.observe();

    assert_eq!(registry.metrics.search_duration_seconds.get_sample_count(), 1);
    let output = registry.gather().unwrap();
    assert!(output.contains("search_duration_seconds_bucket"));
}

#[tokio::test]
async fn test_metrics_with_labels() {
    let registry = MetricsRegistry::new().unwrap();

    registry
        .metrics
        .rate_limit_wait_seconds
        .with_label_values(&["duckduckgo"])
        .observe(0.2);
    registry
        .metrics
        .provider_duration_seconds
        .with_label_values(&["searxng"])
        .observe(0.8);

    let output = registry.gather().unwrap();
    assert!(output.contains("provider=\"duckduckgo\""));
    assert!(output.contains("provider=\"searxng\""));
}

#[test]
fn test_structured_logging_integration() {
    let logger = LoggingService::new();

    logger.log_search(&failed_search(1));
    logger.log_rate_limit(ProviderId::Google, Duration::from_millis(250), 1);
    logger.log_cache_operation("set", "memory", Some(&"k".repeat(80)), None);

    let mut context = HashMap::new();
    context.insert("provider".to_string(), serde_json::json!("brave"));
    logger.log_error(&SearchError::ProviderRejected("brave: 429".to_string()), Some(context));
}

#[test]
fn test_logging_sanitization() {
    assert_eq!(
        sanitize_query("mail john.doe@example.com or call 555-123-4567"),
        "mail [EMAIL] or call [PHONE]"
    );

    let long_query = "a".repeat(300);
    let sanitized = sanitize_query(&long_query);
    assert_eq!(sanitized.chars().count(), 200);
    assert!(sanitized.ends_with("..."));
}

#[test]
fn test_error_type_classification() {
    let errors = vec![
        SearchError::InvalidRequest("Bad query".to_string()),
        SearchError::ProviderUnavailable("no key".to_string()),
        SearchError::ProviderRejected("403".to_string()),
        SearchError::Network("reset".to_string()),
        SearchError::Timeout("30s".to_string()),
        SearchError::CacheError("locked".to_string()),
        SearchError::Internal("Internal error".to_string()),
    ];

    let expected_types = vec![
        "invalid_request",
        "provider_unavailable",
        "provider_rejected",
        "network_error",
        "timeout",
        "cache_error",
        "internal_error",
    ];

    for (error, expected_type) in errors.iter().zip(expected_types.iter()) {
        assert_eq!(error.error_type(), *expected_type);
    }
}

#[tokio::test]
async fn test_health_with_primary_providers_is_healthy() {
    let orchestrator = SearchOrchestrator::new(ProviderSet::new(
        vec![provider(ProviderId::Brave), provider(ProviderId::Google)],
        vec![provider(ProviderId::DuckDuckGo), provider(ProviderId::Google)],
    ))
    .with_cache(Arc::new(CacheManager::new(Arc::new(MemoryCache::new(Duration::from_secs(60), 10)))));

    let health = HealthService::new().check(&orchestrator).await;

    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.service.name, "web-search-aggregator");
    for component in ["providers", "cache", "search"] {
        assert!(health.components.contains_key(component), "missing {}", component);
    }
    assert!(health.components["cache"].response_time_ms.is_some());
    assert!(health.components["providers"]
        .message
        .as_deref()
        .unwrap()
        .contains("brave, google"));
}

#[tokio::test]
async fn test_health_on_duckduckgo_alone_is_degraded() {
    let ddg = provider(ProviderId::DuckDuckGo);
    let orchestrator = SearchOrchestrator::new(ProviderSet::new(vec![ddg.clone()], vec![ddg]));

    let service = HealthService::new();
    let health = service.check(&orchestrator).await;
    assert_eq!(health.status, HealthStatus::Degraded);

    let readiness = service.readiness(&orchestrator).await;
    assert!(readiness.ready);
    assert_eq!(readiness.checks.len(), 3);
}

#[tokio::test]
async fn test_health_without_providers_is_not_ready() {
    let orchestrator = SearchOrchestrator::new(ProviderSet::default());
    let service = HealthService::new();

    let readiness = service.readiness(&orchestrator).await;
    assert!(!readiness.ready);
    assert_eq!(readiness.checks.get("providers"), Some(&false));
    assert_eq!(readiness.checks.get("cache"), Some(&true));
}

#[tokio::test]
async fn test_low_success_rate_degrades_search_component() {
    let orchestrator = SearchOrchestrator::new(ProviderSet::new(
        vec![provider(ProviderId::Brave)],
        vec![provider(ProviderId::DuckDuckGo)],
    ));
    let service = HealthService::new();

    for n in 0..9 {
        orchestrator.monitor().record_search(failed_search(n));
    }
    assert_eq!(service.check_search(&orchestrator).0, HealthStatus::Healthy);

    orchestrator.monitor().record_search(failed_search(9));
    assert_eq!(service.check_search(&orchestrator).0, HealthStatus::Degraded);

    let health = service.check(&orchestrator).await;
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.components["search"].status, HealthStatus::Degraded);
}
