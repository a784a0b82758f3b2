pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod providers;
pub mod search;
pub mod types;

pub use error::{Result, SearchError};
pub use types::*;
pub use config::Config;
pub use cache::{CacheManager, CacheStore, MemoryCache, PersistentCache};
pub use context::{ExportSummary, SearchContext};
pub use observability::{HealthService, HealthStatus, ObservabilityService, PerformanceMonitor};
pub use providers::{ProviderHandle, ProviderSet, SearchProvider};
pub use search::{
    ResultMerger,
    SearchOrchestrator, WarmupReport,
    RateLimitConfig, RateLimiterRegistry,
    RetryConfig, RetryExecutor,
};
