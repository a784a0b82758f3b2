/// Search orchestration module
///
/// This module contains:
/// - Provider dispatch in single, auto and all modes
/// - Per-provider token bucket rate limiting
/// - Exponential backoff retries for transient provider failures
/// - Result merging and deduplication

pub mod merger;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;


pub use merger::{canonical_url, ResultMerger};
pub use orchestrator::{SearchOrchestrator, WarmupReport};
pub use rate_limiter::{RateLimitConfig, RateLimiterRegistry, RateLimiterStatus, TokenBucket};
pub use retry::{RetryConfig, RetryExecutor};
