pub mod metrics;
pub mod tracing;
pub mod logging;
pub mod health;
pub mod monitor;

#[cfg(test)]
mod tests;

pub use metrics::{Metrics, MetricsRegistry, Timer};
pub use self::tracing::{build_filter, init_tracing, init_tracing_with, LogFormat};
pub use logging::{sanitize_query, LoggingService};
pub use health::{ComponentHealth, HealthResponse, HealthService, HealthStatus, ReadinessResponse};
pub use monitor::{PerformanceMonitor, PerformanceReport, ProviderCall, SearchMetrics};

use crate::error::Result;
use std::sync::Arc;

/// Metrics, structured logging and health checks bundled together
#[derive(Clone)]
pub struct ObservabilityService {
    pub metrics: Arc<MetricsRegistry>,
    pub logging: LoggingService,
    pub health: HealthService,
}

impl ObservabilityService {
    /// Initialize all observability components
    pub fn new() -> Result<Self> {
        Ok(Self {
            metrics: Arc::new(MetricsRegistry::new()?),
            logging: LoggingService::new(),
            health: HealthService::new(),
        })
    }

    /// Install the global tracing subscriber
    pub fn init_global(&self) -> Result<()> {
        init_tracing()
    }
}
