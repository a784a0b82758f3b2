//! Retry logic with exponential backoff for provider calls
//!
//! Transient provider faults (network errors, timeouts) are retried with a
//! capped exponential delay. Everything else propagates on the first attempt.

use crate::error::{Result, SearchError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Decides whether a fault is worth another attempt
pub type RetryPredicate = fn(&SearchError) -> bool;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor applied per attempt
    pub exponential_base: f64,
    /// Jitter factor (0.0 to 1.0) added on top of the computed delay
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1), // 1s, 2s, 4s ...
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter_factor: 0.0,
        }
    }
}

/// Runs an async operation under the configured backoff policy
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    predicate: RetryPredicate,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::with_config(RetryConfig::default())
    }
}

impl RetryExecutor {
    /// Create a retry executor with custom backoff config
    pub fn with_config(config: RetryConfig) -> Self {
        Self {
            config,
            predicate: SearchError::is_retryable,
        }
    }

    /// A single attempt, no backoff
    pub fn no_retry() -> Self {
        Self::with_config(RetryConfig {
            max_attempts: 1,
            ..Default::default()
        })
    }

    /// Replace the retryable-fault predicate; the default is
    /// [`SearchError::is_retryable`]
    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_labeled("operation", operation).await
    }

    /// Execute an operation, tagging log lines with `label`
    pub async fn execute_labeled<F, Fut, T>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("{} succeeded after {} retries", label, attempt);
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !(self.predicate)(&err) {
                        debug!("{} failed with non-retryable error: {}", label, err);
                        return Err(err);
                    }

                    if attempt + 1 >= max_attempts {
                        error!("{} failed after {} attempts: {}", label, max_attempts, err);
                        return Err(err);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label,
                        attempt + 1,
                        max_attempts,
                        delay,
                        err
                    );
                    sleep(delay).await;
                }
            }
        }

        Err(SearchError::Internal(format!("{}: retry loop made no attempts", label)))
    }

    /// Delay slept after the failed attempt with zero-based index `attempt`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let config = &self.config;
        let exponential = config.initial_delay.as_secs_f64() * config.exponential_base.powi(attempt as i32);
        let capped = exponential.min(config.max_delay.as_secs_f64());

        let jitter = if config.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            capped * config.jitter_factor * rng.gen::<f64>()
        } else {
            0.0
        };

        Duration::from_secs_f64((capped + jitter).max(0.0))
    }
}
