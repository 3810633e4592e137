//! Retry configuration, backoff strategies, and the retry middleware.

use crate::middleware::{clone_request, Middleware, MiddlewareChain};
use crate::{HttpClientError, Response, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::Request;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Predicate overriding the default retry decision.
///
/// Receives the 1-indexed attempt that just completed and its outcome;
/// returns whether the call should be retried. Supplying one fully replaces
/// the default decision, including status-code handling. The engine never
/// inspects the request method; idempotency is the predicate author's call.
pub type RetryPredicate =
    Arc<dyn Fn(u32, Option<&HttpClientError>, Option<&Response>) -> bool + Send + Sync>;

/// Retry configuration.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Status codes that should trigger a retry.
    pub retry_status_codes: Vec<u16>,
    /// Whether to retry on connection errors.
    pub retry_on_connection_error: bool,
    /// Whether to retry on timeout errors.
    pub retry_on_timeout: bool,
    /// Custom retry decision, replacing the default entirely.
    pub predicate: Option<RetryPredicate>,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("retry_status_codes", &self.retry_status_codes)
            .field("retry_on_connection_error", &self.retry_on_connection_error)
            .field("retry_on_timeout", &self.retry_on_timeout)
            .field("predicate", &self.predicate.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_secs(10),
                multiplier: 2.0,
            },
            retry_status_codes: vec![500, 502, 503, 504],
            retry_on_connection_error: true,
            retry_on_timeout: true,
            predicate: None,
        }
    }
}

impl RetryConfig {
    /// Aggressive preset: more attempts, short jittered delays.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffStrategy::ExponentialJitter {
                base: Duration::from_millis(50),
                max: Duration::from_secs(5),
                multiplier: 2.0,
                jitter: Duration::from_millis(50),
            },
            ..Default::default()
        }
    }

    /// Conservative preset: a single retry after a longer delay.
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            backoff: BackoffStrategy::Fixed(Duration::from_secs(1)),
            ..Default::default()
        }
    }

    /// Create a retry config with exponential backoff.
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Exponential {
                base,
                max: Duration::from_secs(30),
                multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    /// Create a retry config with linear backoff.
    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Linear {
                base,
                max: Duration::from_secs(30),
            },
            ..Default::default()
        }
    }

    /// Create a retry config with a fixed delay.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Fixed(delay),
            ..Default::default()
        }
    }

    /// Set the status codes to retry on.
    pub fn with_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retry_status_codes = codes;
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Install a custom retry predicate.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(u32, Option<&HttpClientError>, Option<&Response>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Disable retry on connection errors.
    pub fn no_retry_on_connection(mut self) -> Self {
        self.retry_on_connection_error = false;
        self
    }

    /// Disable retry on timeout errors.
    pub fn no_retry_on_timeout(mut self) -> Self {
        self.retry_on_timeout = false;
        self
    }

    /// Check if a status code should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    /// Calculate the delay after a given 1-indexed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }

    /// Decide whether the outcome of `attempt` should be retried.
    fn should_retry(
        &self,
        attempt: u32,
        error: Option<&HttpClientError>,
        response: Option<&Response>,
    ) -> bool {
        if let Some(predicate) = &self.predicate {
            return predicate(attempt, error, response);
        }

        if let Some(e) = error {
            return match e {
                HttpClientError::Timeout(_) => self.retry_on_timeout,
                HttpClientError::Connection(_) => self.retry_on_connection_error,
                HttpClientError::Response { status, .. } => self.should_retry_status(*status),
                HttpClientError::Http(e) => {
                    if e.is_timeout() {
                        self.retry_on_timeout
                    } else if e.is_connect() {
                        self.retry_on_connection_error
                    } else if let Some(status) = e.status() {
                        self.should_retry_status(status.as_u16())
                    } else {
                        false
                    }
                }
                _ => false,
            };
        }

        if let Some(response) = response {
            return self.should_retry_status(response.status().as_u16());
        }

        false
    }
}

/// Backoff strategy for retries.
///
/// Delays are computed from the 1-indexed attempt that just failed and capped
/// at the strategy's maximum.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// Same delay between all retries.
    Fixed(Duration),
    /// Delay grows by `base` per attempt.
    Linear {
        /// Delay increment per attempt.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
    /// Delay multiplies each attempt.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier applied per attempt.
        multiplier: f64,
    },
    /// Exponential plus a uniform random jitter in `[0, jitter)`.
    ExponentialJitter {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier applied per attempt.
        multiplier: f64,
        /// Upper bound of the jitter window.
        jitter: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate the delay after a given 1-indexed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Fixed(d) => *d,
            Self::Linear { base, max } => base.saturating_mul(attempt).min(*max),
            Self::Exponential {
                base,
                max,
                multiplier,
            } => exponential_delay(*base, *multiplier, attempt).min(*max),
            Self::ExponentialJitter {
                base,
                max,
                multiplier,
                jitter,
            } => {
                let delay = exponential_delay(*base, *multiplier, attempt).min(*max);
                let jitter_millis = jitter.as_millis() as u64;
                if jitter_millis == 0 {
                    return delay;
                }
                let sampled = rand::thread_rng().gen_range(0..jitter_millis);
                delay + Duration::from_millis(sampled)
            }
        }
    }
}

fn exponential_delay(base: Duration, multiplier: f64, attempt: u32) -> Duration {
    let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
    let millis = (base.as_millis() as f64 * factor).min(u64::MAX as f64) as u64;
    Duration::from_millis(millis)
}

/// Retry middleware wrapping the inner chain in a bounded attempt loop.
///
/// The circuit breaker sits inside this loop, so every attempt counts
/// against the breaker's totals.
pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    /// Create a new retry middleware.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn handle(&self, request: Request, next: &MiddlewareChain) -> Result<Response> {
        let mut attempt: u32 = 1;

        loop {
            let current = match clone_request(&request) {
                Some(clone) => clone,
                // Streaming bodies cannot be replayed; single attempt.
                None => return next.next(request).await,
            };

            let result = next.next(current).await;

            let retry = match &result {
                Ok(response) => self.config.should_retry(attempt, None, Some(response)),
                Err(e) => self.config.should_retry(attempt, Some(e), None),
            };

            if !retry || attempt >= self.config.max_attempts {
                return result;
            }

            let delay = self.config.delay_for_attempt(attempt);
            if let Some(remaining) = next.overrides().remaining() {
                if delay >= remaining {
                    // Sleeping would overshoot the deadline; surface the last
                    // observed result instead.
                    return result;
                }
            }

            match &result {
                Ok(response) => debug!(
                    attempt,
                    status = %response.status(),
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request due to status code"
                ),
                Err(e) => debug!(
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request due to error"
                ),
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
