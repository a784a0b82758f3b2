//! Per-provider token-bucket rate limiting
//!
//! Each provider gets its own bucket sized to the provider's published quota.
//! Buckets refill lazily on access; callers that find the bucket empty sleep
//! for exactly the time needed to accumulate the missing tokens.

use crate::error::{Result, SearchError};
use crate::observability::logging::LoggingService;
use crate::types::ProviderId;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Budget for a single provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Requests allowed per window, also the bucket capacity
    pub max_requests: u32,
    /// Window length
    pub time_window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, time_window: Duration) -> Self {
        Self {
            max_requests,
            time_window,
        }
    }

    /// Tokens generated per second
    pub fn rate(&self) -> f64 {
        let window = self.time_window.as_secs_f64();
        if window <= 0.0 {
            return f64::INFINITY;
        }
        self.max_requests as f64 / window
    }

    /// Published quota for each provider
    pub fn default_for(provider: ProviderId) -> Self {
        match provider {
            // 100 per day
            ProviderId::Google => Self::new(100, Duration::from_secs(86_400)),
            // 2000 per month
            ProviderId::Brave => Self::new(2_000, Duration::from_secs(2_592_000)),
            // Free and self-hosted providers only get a loose guard
            ProviderId::DuckDuckGo => Self::new(1_000, Duration::from_secs(60)),
            ProviderId::Searxng => Self::new(1_000, Duration::from_secs(60)),
        }
    }
}

/// Point-in-time view of one bucket
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RateLimiterStatus {
    pub available_tokens: f64,
    pub max_tokens: u32,
    pub rate: f64,
    /// Percentage of the bucket currently drained
    pub utilization: f64,
}

#[derive(Debug)]
struct BucketState {
    available: f64,
    last_refill: Instant,
}

/// Token bucket guarding one provider
#[derive(Debug)]
pub struct TokenBucket {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        debug!(
            "Rate limiter initialized: {} requests per {:?} ({:.4} req/s)",
            config.max_requests,
            config.time_window,
            config.rate()
        );

        Self {
            config,
            state: Mutex::new(BucketState {
                available: config.max_requests as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let capacity = self.config.max_requests as f64;
        state.available = (state.available + elapsed * self.config.rate()).min(capacity);
        state.last_refill = now;
    }

    /// A request larger than the bucket can ever hold is refused outright
    fn check_request(&self, tokens: u32) -> Result<f64> {
        if tokens > self.config.max_requests {
            return Err(SearchError::InvalidRequest(format!(
                "{} tokens requested but the bucket holds at most {}",
                tokens, self.config.max_requests
            )));
        }
        Ok(tokens as f64)
    }

    /// Take `tokens`, sleeping until enough have accumulated.
    ///
    /// Returns the total time spent waiting. The lock is held for the whole
    /// refill/deduct/sleep cycle so concurrent callers are served in turn.
    pub async fn acquire(&self, tokens: u32) -> Result<Duration> {
        let needed = self.check_request(tokens)?;
        let started = Instant::now();
        let mut state = self.state.lock().await;

        loop {
            self.refill(&mut state);

            if state.available >= needed {
                state.available -= needed;
                debug!("Token acquired, remaining: {:.2}", state.available);
                return Ok(started.elapsed());
            }

            let missing = needed - state.available;
            let wait = Duration::from_secs_f64(missing / self.config.rate()).max(Duration::from_millis(1));
            debug!("Rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
    }

    /// Take `tokens` only if they are available right now
    pub async fn try_acquire(&self, tokens: u32) -> Result<bool> {
        let needed = self.check_request(tokens)?;
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.available >= needed {
            state.available -= needed;
            Ok(true)
        } else {
            debug!("Rate limit reached, tokens available: {:.2}", state.available);
            Ok(false)
        }
    }

    pub async fn status(&self) -> RateLimiterStatus {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        let max = self.config.max_requests as f64;
        let utilization = if max > 0.0 {
            (1.0 - state.available / max) * 100.0
        } else {
            0.0
        };

        RateLimiterStatus {
            available_tokens: round2(state.available),
            max_tokens: self.config.max_requests,
            rate: round2(self.config.rate()),
            utilization: round2(utilization),
        }
    }
}

/// One bucket per provider identity; unknown identities pass freely
pub struct RateLimiterRegistry {
    limiters: HashMap<ProviderId, TokenBucket>,
    logger: LoggingService,
}

impl RateLimiterRegistry {
    pub fn new(configs: HashMap<ProviderId, RateLimitConfig>) -> Self {
        let limiters: HashMap<_, _> = configs
            .into_iter()
            .map(|(provider, config)| (provider, TokenBucket::new(config)))
            .collect();

        info!("Rate limiter registry initialized with {} providers", limiters.len());

        Self {
            limiters,
            logger: LoggingService::new(),
        }
    }

    /// Buckets for every provider at its published quota
    pub fn with_defaults() -> Self {
        Self::new(
            ProviderId::ALL
                .iter()
                .map(|id| (*id, RateLimitConfig::default_for(*id)))
                .collect(),
        )
    }

    /// A registry with no buckets; every acquire passes immediately
    pub fn unlimited() -> Self {
        Self::new(HashMap::new())
    }

    pub async fn acquire(&self, provider: ProviderId, tokens: u32) -> Result<Duration> {
        match self.limiters.get(&provider) {
            Some(bucket) => {
                let waited = bucket.acquire(tokens).await?;
                if !waited.is_zero() {
                    self.logger.log_rate_limit(provider, waited, tokens);
                }
                Ok(waited)
            }
            None => {
                debug!("No rate limiter for provider: {}", provider);
                Ok(Duration::ZERO)
            }
        }
    }

    pub async fn try_acquire(&self, provider: ProviderId, tokens: u32) -> Result<bool> {
        match self.limiters.get(&provider) {
            Some(bucket) => bucket.try_acquire(tokens).await,
            None => Ok(true),
        }
    }

    pub async fn status(&self, provider: ProviderId) -> Option<RateLimiterStatus> {
        match self.limiters.get(&provider) {
            Some(bucket) => Some(bucket.status().await),
            None => None,
        }
    }

    pub async fn all_status(&self) -> BTreeMap<String, RateLimiterStatus> {
        let mut report = BTreeMap::new();
        for (provider, bucket) in &self.limiters {
            report.insert(provider.to_string(), bucket.status().await);
        }
        report
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_capacity_bound_under_burst() {
        let bucket = TokenBucket::new(RateLimitConfig::new(5, Duration::from_secs(1)));
        let start = Instant::now();

        for _ in 0..5 {
            bucket.acquire(1).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(10));

        for _ in 0..3 {
            bucket.acquire(1).await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(590), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(700), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let bucket = TokenBucket::new(RateLimitConfig::new(5, Duration::from_secs(1)));
        bucket.acquire(3).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;

        let status = bucket.status().await;
        assert_eq!(status.available_tokens, 5.0);
        assert_eq!(status.utilization, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_never_waits() {
        let bucket = TokenBucket::new(RateLimitConfig::new(2, Duration::from_secs(10)));

        assert!(bucket.try_acquire(1).await.unwrap());
        assert!(bucket.try_acquire(1).await.unwrap());
        assert!(!bucket.try_acquire(1).await.unwrap());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(bucket.try_acquire(1).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_above_capacity_is_refused_by_both_paths() {
        let bucket = TokenBucket::new(RateLimitConfig::new(2, Duration::from_secs(10)));

        tokio_test::assert_err!(bucket.acquire(3).await);
        tokio_test::assert_err!(bucket.try_acquire(3).await);

        // nothing was deducted by the refused requests
        assert_eq!(bucket.status().await.available_tokens, 2.0);
        assert_eq!(tokio_test::assert_ok!(bucket.acquire(2).await), Duration::ZERO);
        assert!(!tokio_test::assert_ok!(bucket.try_acquire(1).await));
    }

    #[tokio::test]
    async fn test_unknown_provider_bypasses_limit() {
        let registry = RateLimiterRegistry::new(HashMap::from([(
            ProviderId::Google,
            RateLimitConfig::new(1, Duration::from_secs(86_400)),
        )]));

        assert!(registry.try_acquire(ProviderId::Google, 1).await.unwrap());
        assert!(!registry.try_acquire(ProviderId::Google, 1).await.unwrap());
        for _ in 0..10 {
            assert!(registry.try_acquire(ProviderId::Brave, 1).await.unwrap());
        }
        assert_eq!(registry.acquire(ProviderId::Brave, 1).await.unwrap(), Duration::ZERO);
        assert!(registry.status(ProviderId::Brave).await.is_none());
    }

    #[tokio::test]
    async fn test_default_registry_status() {
        let registry = RateLimiterRegistry::with_defaults();
        let status = registry.all_status().await;

        assert_eq!(status.len(), 4);
        assert_eq!(status["google"].max_tokens, 100);
        assert_eq!(status["brave"].max_tokens, 2000);
        assert_eq!(status["duckduckgo"].rate, 16.67);
    }
}
