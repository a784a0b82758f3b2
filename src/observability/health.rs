use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use crate::search::SearchOrchestrator;
use crate::types::ProviderId;

/// Searches needed before the success rate counts toward health
pub const MIN_SEARCHES_FOR_RATE: u64 = 10;

/// Success rate percentage below which the search component is degraded
pub const DEGRADED_SUCCESS_RATE: f64 = 50.0;

/// Health checks over the orchestrator's providers, cache and recent searches
#[derive(Clone)]
pub struct HealthService {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    started_at: Instant,
}

/// Health status of individual components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub message: Option<String>,
    pub response_time_ms: Option<f64>,
}

/// Overall health status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub service: ServiceInfo,
    pub components: HashMap<String, ComponentHealth>,
    pub uptime_seconds: u64,
}

/// Service information
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub environment: String,
}

/// Readiness summary: ready unless some component is unhealthy
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: BTreeMap<String, bool>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthService {
    /// Create a new health service
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            started_at: Instant::now(),
        }
    }

    /// Update component health status
    pub async fn update_component_health(
        &self,
        component: &str,
        status: HealthStatus,
        message: Option<String>,
        response_time_ms: Option<f64>,
    ) {
        let health = ComponentHealth {
            status,
            last_check: chrono::Utc::now(),
            message,
            response_time_ms,
        };

        let mut components = self.components.write().await;
        components.insert(component.to_string(), health);
    }

    /// Latest recorded health of every component
    pub async fn components(&self) -> HashMap<String, ComponentHealth> {
        self.components.read().await.clone()
    }

    /// Provider availability. Running on the keyless DuckDuckGo fallback
    /// alone is degraded; no providers at all is unhealthy.
    pub fn check_providers(&self, orchestrator: &SearchOrchestrator) -> (HealthStatus, Option<String>) {
        let providers = orchestrator.providers();
        let primary = providers.primary_ids();
        let fallback = providers.fallback_ids();
        let names = |ids: &[ProviderId]| ids.iter().map(ProviderId::as_str).collect::<Vec<_>>().join(", ");

        if providers.is_empty() {
            return (HealthStatus::Unhealthy, Some("No search providers are enabled".to_string()));
        }

        let message = format!("primary: [{}], fallback: [{}]", names(primary.as_slice()), names(fallback.as_slice()));
        if primary.is_empty() || primary == [ProviderId::DuckDuckGo] {
            (HealthStatus::Degraded, Some(format!("Only fallback providers available; {}", message)))
        } else {
            (HealthStatus::Healthy, Some(message))
        }
    }

    /// Cache reachability; a broken cache degrades but never fails search
    pub async fn check_cache(&self, orchestrator: &SearchOrchestrator) -> (HealthStatus, Option<String>, Option<f64>) {
        let cache = orchestrator.cache();
        if !cache.is_enabled() {
            return (HealthStatus::Healthy, Some("Result cache disabled".to_string()), None);
        }

        let start = Instant::now();
        match cache.stats().await {
            Ok(report) => {
                let duration = start.elapsed().as_secs_f64() * 1000.0;
                let message = format!(
                    "{} cache: {}/{} entries, hit ratio {:.2}",
                    report.store.backend, report.store.size, report.store.max_size, report.lookups.hit_ratio
                );
                (HealthStatus::Healthy, Some(message), Some(duration))
            }
            Err(e) => (
                HealthStatus::Degraded,
                Some(format!("Cache unavailable: {}", e)),
                None,
            ),
        }
    }

    /// Recent search success rate
    pub fn check_search(&self, orchestrator: &SearchOrchestrator) -> (HealthStatus, Option<String>) {
        let overall = orchestrator.monitor().overall_stats();
        let message = format!(
            "{} searches, success rate {:.2}%",
            overall.total_requests, overall.success_rate
        );

        if overall.total_requests >= MIN_SEARCHES_FOR_RATE && overall.success_rate < DEGRADED_SUCCESS_RATE {
            (HealthStatus::Degraded, Some(message))
        } else {
            (HealthStatus::Healthy, Some(message))
        }
    }

    /// Perform comprehensive health check
    pub async fn check(&self, orchestrator: &SearchOrchestrator) -> HealthResponse {
        let (provider_status, provider_message) = self.check_providers(orchestrator);
        self.update_component_health("providers", provider_status, provider_message, None)
            .await;

        let (cache_status, cache_message, cache_time) = self.check_cache(orchestrator).await;
        self.update_component_health("cache", cache_status, cache_message, cache_time)
            .await;

        let (search_status, search_message) = self.check_search(orchestrator);
        self.update_component_health("search", search_status, search_message, None)
            .await;

        let components = self.components.read().await;
        let overall_status = calculate_overall_status(&components);

        HealthResponse {
            status: overall_status,
            timestamp: chrono::Utc::now(),
            service: ServiceInfo {
                name: "web-search-aggregator".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            },
            components: components.clone(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Readiness check: every component must be at least degraded
    pub async fn readiness(&self, orchestrator: &SearchOrchestrator) -> ReadinessResponse {
        let health = self.check(orchestrator).await;
        let checks: BTreeMap<_, _> = health
            .components
            .iter()
            .map(|(name, component)| (name.clone(), component.status != HealthStatus::Unhealthy))
            .collect();

        ReadinessResponse {
            ready: checks.values().all(|ok| *ok),
            checks,
            timestamp: health.timestamp,
        }
    }

    /// Liveness check: the process is running
    pub fn liveness(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "alive",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_seconds": self.started_at.elapsed().as_secs()
        })
    }
}

/// Worst status across components
pub fn calculate_overall_status(components: &HashMap<String, ComponentHealth>) -> HealthStatus {
    let mut has_degraded = false;

    for health in components.values() {
        match health.status {
            HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
            HealthStatus::Degraded => has_degraded = true,
            HealthStatus::Healthy => {}
        }
    }

    if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(status: HealthStatus) -> ComponentHealth {
        ComponentHealth {
            status,
            last_check: chrono::Utc::now(),
            message: None,
            response_time_ms: None,
        }
    }

    #[tokio::test]
    async fn test_health_service_creation() {
        let service = HealthService::new();
        assert!(service.components().await.is_empty());
    }

    #[tokio::test]
    async fn test_component_health_update() {
        let service = HealthService::new();

        service.update_component_health(
            "test_component",
            HealthStatus::Healthy,
            Some("All good".to_string()),
            Some(10.5),
        ).await;

        let components = service.components().await;
        let health = components.get("test_component").unwrap();

        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.message, Some("All good".to_string()));
        assert_eq!(health.response_time_ms, Some(10.5));
    }

    #[test]
    fn test_overall_status_calculation() {
        let mut components = HashMap::new();
        components.insert("providers".to_string(), component(HealthStatus::Healthy));
        components.insert("cache".to_string(), component(HealthStatus::Healthy));
        assert_eq!(calculate_overall_status(&components), HealthStatus::Healthy);

        components.insert("search".to_string(), component(HealthStatus::Degraded));
        assert_eq!(calculate_overall_status(&components), HealthStatus::Degraded);

        components.insert("providers".to_string(), component(HealthStatus::Unhealthy));
        assert_eq!(calculate_overall_status(&components), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&HealthStatus::Degraded).unwrap(), "\"degraded\"");
    }

    #[test]
    fn test_liveness() {
        let live = HealthService::new().liveness();
        assert_eq!(live["status"], "alive");
    }
}
