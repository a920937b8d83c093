//! Per-service rate limiting and bounded retry for network-backed resolvers.
//!
//! One governor instance per external service, shared process-wide: one
//! outbound call per service per fixed interval, across all reference keys.
//! Upstream services throttle or ban violators, so the gate is strict.
//! Retries block the calling flow with a fixed backoff; after the bounded
//! attempts are exhausted the caller degrades to an empty result.

use std::collections::HashMap;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Type alias for governor's direct rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Error type for service calls, classifying transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Server returned 429 Too Many Requests.
    RateLimited,
    /// Server returned 403 Forbidden (keyless quota exhausted upstream).
    Forbidden,
    /// Request or gateway timeout.
    Timeout,
    /// Any other error.
    Other(String),
}

impl ServiceError {
    /// Transient failures are retried; everything else fails the call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::RateLimited | ServiceError::Forbidden | ServiceError::Timeout
        )
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::RateLimited => write!(f, "rate limited (429)"),
            ServiceError::Forbidden => write!(f, "forbidden (403)"),
            ServiceError::Timeout => write!(f, "timed out"),
            ServiceError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<String> for ServiceError {
    fn from(s: String) -> Self {
        ServiceError::Other(s)
    }
}

/// Fixed-interval gate for one external service.
///
/// A zero interval disables the gate (used for local services and tests).
pub struct ServiceLimiter {
    limiter: Option<DirectLimiter>,
}

impl ServiceLimiter {
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(DirectLimiter::direct);
        Self { limiter }
    }

    /// Wait until the gate allows the next call.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

/// Collection of per-service limiters, keyed by service name.
pub struct ServiceLimiters {
    limiters: HashMap<&'static str, ServiceLimiter>,
}

impl ServiceLimiters {
    pub fn new(intervals: impl IntoIterator<Item = (&'static str, Duration)>) -> Self {
        let limiters = intervals
            .into_iter()
            .map(|(name, interval)| (name, ServiceLimiter::new(interval)))
            .collect();
        Self { limiters }
    }

    pub fn get(&self, service: &str) -> Option<&ServiceLimiter> {
        self.limiters.get(service)
    }
}

/// Bounded retry with fixed backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(30),
        }
    }
}

/// Call a service through its rate-limit gate, retrying transient failures.
///
/// 1. Acquires the service's limiter (waits if needed)
/// 2. Runs the operation
/// 3. On a transient error: sleeps the fixed backoff, retries (bounded)
/// 4. On success or a non-transient error: returns immediately
pub async fn call_with_retry<T, F, Fut>(
    service: &str,
    limiter: Option<&ServiceLimiter>,
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0;
    loop {
        if let Some(limiter) = limiter {
            limiter.acquire().await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                log::info!(
                    "{service}: {err}, retry {attempt}/{} after {:.1}s",
                    policy.max_retries,
                    policy.backoff.as_secs_f64()
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
