//! Retry, backoff and throttling around every inference call.
//!
//! Transient failures (timeouts, rate limits) are retried on an exponential
//! schedule. A rate-limit response that advises a longer wait wins over the
//! schedule. Each attempt runs under its own timeout, a concurrency permit
//! and, when configured, a token-bucket limiter. Once attempts run out the
//! caller's fallback produces the value and the result is marked degraded.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::domain::errors::InferenceError;
use crate::domain::models::{RateLimitConfig, RetryConfig};

/// Retry policy with exponential backoff
///
/// Delay before retry `n` (1-based) is `initial_backoff * 2^(n-1)`, capped at
/// `max_backoff`. With the defaults that is 2s, 4s, 8s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Bound on a single attempt, independent of the retry budget
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }
}

impl RetryPolicy {
    /// Fresh jitter-free exponential schedule.
    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_randomization_factor(0.0)
            .with_multiplier(2.0)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }

    /// The first `count` scheduled delays, rounded to whole milliseconds.
    pub fn delays(&self, count: usize) -> Vec<Duration> {
        let mut schedule = self.schedule();
        (0..count)
            .map(|_| round_to_millis(schedule.next_backoff().unwrap_or(self.max_backoff)))
            .collect()
    }

    fn next_delay(&self, schedule: &mut ExponentialBackoff, error: &InferenceError) -> Duration {
        let scheduled = round_to_millis(schedule.next_backoff().unwrap_or(self.max_backoff));
        match error.retry_after() {
            Some(advised) if advised > scheduled => advised,
            _ => scheduled,
        }
    }
}

fn round_to_millis(delay: Duration) -> Duration {
    Duration::from_millis(delay.as_millis() as u64)
}

/// Value produced by a guarded call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome<T> {
    pub value: T,
    /// Produced by the fallback rather than the provider
    pub degraded: bool,
    pub attempts: u32,
    /// Last provider error when degraded
    pub error: Option<InferenceError>,
}

impl<T> CallOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        CallOutcome {
            value: f(self.value),
            degraded: self.degraded,
            attempts: self.attempts,
            error: self.error,
        }
    }
}

/// Wraps inference calls with retry, timeout, concurrency and rate limits.
pub struct RetryController {
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RetryController {
    /// Controller without client-side rate limiting.
    pub fn new(policy: RetryPolicy, max_concurrent_requests: usize) -> Self {
        Self {
            policy,
            permits: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            limiter: None,
        }
    }

    /// Controller configured from the retry and rate-limit sections.
    pub fn from_config(retry: &RetryConfig, rate_limit: &RateLimitConfig) -> Self {
        let controller = Self::new(RetryPolicy::from(retry), rate_limit.max_concurrent_requests);
        match build_limiter(rate_limit) {
            Some(limiter) => controller.with_limiter(limiter),
            None => controller,
        }
    }

    pub fn with_limiter(mut self, limiter: DefaultDirectRateLimiter) -> Self {
        self.limiter = Some(Arc::new(limiter));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` with retries. Returns the last error once attempts are spent.
    pub async fn execute<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, InferenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        self.execute_counted(operation, op).await.0
    }

    /// Run `operation` with retries, falling back to `fallback` when it fails.
    pub async fn execute_or_fallback<T, F, Fut, Fb>(
        &self,
        operation: &str,
        op: F,
        fallback: Fb,
    ) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
        Fb: FnOnce(&InferenceError) -> T,
    {
        let (result, attempts) = self.execute_counted(operation, op).await;
        match result {
            Ok(value) => CallOutcome {
                value,
                degraded: false,
                attempts,
                error: None,
            },
            Err(err) => {
                warn!(
                    operation,
                    attempts,
                    error_kind = err.kind(),
                    error = %err,
                    "Inference unavailable, using heuristic fallback"
                );
                CallOutcome {
                    value: fallback(&err),
                    degraded: true,
                    attempts,
                    error: Some(err),
                }
            }
        }
    }

    async fn execute_counted<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> (Result<T, InferenceError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        let mut schedule = self.policy.schedule();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = self.attempt_once(&mut op).await;

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Inference call succeeded after retry");
                    }
                    return (Ok(value), attempt);
                }
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.next_delay(&mut schedule, &err);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient inference failure, retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(operation, attempt, error = %err, "Retry budget exhausted");
                    } else {
                        debug!(operation, error = %err, "Permanent inference failure, not retrying");
                    }
                    return (Err(err), attempt);
                }
            }
        }
    }

    async fn attempt_once<T, F, Fut>(&self, op: &mut F) -> Result<T, InferenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        // The semaphore is never closed, so acquisition only fails on shutdown paths.
        let _permit = self.permits.acquire().await.ok();
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        match timeout(self.policy.call_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(self.policy.call_timeout)),
        }
    }
}

/// Token bucket from the rate-limit section, `None` when rps is not positive.
fn build_limiter(config: &RateLimitConfig) -> Option<DefaultDirectRateLimiter> {
    if !(config.requests_per_second.is_finite() && config.requests_per_second > 0.0) {
        return None;
    }
    let period = Duration::from_secs_f64(1.0 / config.requests_per_second);
    let burst = NonZeroU32::new(config.burst_size.max(1))?;
    Quota::with_period(period).map(|quota| RateLimiter::direct(quota.allow_burst(burst)))
}
