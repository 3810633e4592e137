//! Circuit breaker state machine and middleware.

use crate::middleware::{Middleware, MiddlewareChain};
use crate::{HttpClientError, Response, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Request;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, a bounded number of probes is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Request counts within the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Requests admitted.
    pub requests: u32,
    /// Successful results.
    pub total_successes: u32,
    /// Failed results.
    pub total_failures: u32,
    /// Current success streak.
    pub consecutive_successes: u32,
    /// Current failure streak.
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Trip decision evaluated after every failure in the closed state.
pub type ReadyToTrip = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Observer invoked on every state transition, outside the breaker lock.
///
/// Must be side-effect only and must not call back into the breaker.
pub type StateChangeHandler = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Circuit breaker configuration.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Breaker name, used in logs and the state-change observer.
    pub name: String,
    /// Probes admitted while half-open; also the consecutive successes
    /// needed to close again.
    pub max_requests: u32,
    /// Rolling window in the closed state; counts reset when it elapses.
    /// Zero keeps counts for the lifetime of the closed state.
    pub interval: Duration,
    /// How long the breaker stays open before probing.
    pub timeout: Duration,
    /// Trip decision; evaluated with the window counts after each failure.
    pub ready_to_trip: ReadyToTrip,
    /// State transition observer.
    pub on_state_change: Option<StateChangeHandler>,
    /// Status codes counted as failures (alongside transport errors).
    pub failure_status_codes: Vec<u16>,
}

impl std::fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("failure_status_codes", &self.failure_status_codes)
            .finish()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        // Trip at a 50% failure rate once the window holds at least 5 requests.
        Self {
            name: "default".to_string(),
            max_requests: 1,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            ready_to_trip: Arc::new(|counts| {
                counts.requests >= 5 && counts.total_failures * 2 >= counts.requests
            }),
            on_state_change: None,
            failure_status_codes: vec![500, 502, 503, 504],
        }
    }
}

impl CircuitBreakerConfig {
    /// Aggressive preset: trips at a 30% failure rate over at least 3
    /// requests and recovers quickly.
    pub fn aggressive() -> Self {
        Self {
            name: "aggressive".to_string(),
            timeout: Duration::from_secs(20),
            ready_to_trip: Arc::new(|counts| {
                counts.requests >= 3 && counts.total_failures * 10 >= counts.requests * 3
            }),
            ..Default::default()
        }
    }

    /// Conservative preset: trips at an 80% failure rate over at least 10
    /// requests and stays open longer.
    pub fn conservative() -> Self {
        Self {
            name: "conservative".to_string(),
            timeout: Duration::from_secs(120),
            ready_to_trip: Arc::new(|counts| {
                counts.requests >= 10 && counts.total_failures * 5 >= counts.requests * 4
            }),
            ..Default::default()
        }
    }

    /// Set the breaker name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the half-open probe budget.
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests.max(1);
        self
    }

    /// Set the open-state timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the closed-state rolling window.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the trip decision.
    pub fn with_ready_to_trip<F>(mut self, ready_to_trip: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Arc::new(ready_to_trip);
        self
    }

    /// Install a state-change observer.
    pub fn with_on_state_change<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(handler));
        self
    }

    /// Set the status codes counted as failures.
    pub fn with_failure_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.failure_status_codes = codes;
        self
    }
}

#[derive(Debug)]
struct Shared {
    state: CircuitState,
    counts: Counts,
    /// Bumped on every transition and closed-window rollover; results tagged
    /// with an older generation are discarded.
    generation: u64,
    /// Open-state probe time or closed-state window end.
    expiry: Option<Instant>,
}

type Transition = (CircuitState, CircuitState);

/// Circuit breaker implementation.
///
/// All state sits behind one mutex; the state-change observer always runs
/// after the lock is released.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    shared: Mutex<Shared>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let expiry = if config.interval > Duration::ZERO {
            Some(Instant::now() + config.interval)
        } else {
            None
        };
        Self {
            config,
            shared: Mutex::new(Shared {
                state: CircuitState::Closed,
                counts: Counts::default(),
                generation: 0,
                expiry,
            }),
        }
    }

    /// The breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the current circuit state, advancing open → half-open when the
    /// open timeout has elapsed.
    pub fn state(&self) -> CircuitState {
        let (state, transition) = {
            let mut shared = self.shared.lock();
            let transition = self.advance(&mut shared, Instant::now());
            (shared.state, transition)
        };
        self.notify(transition);
        state
    }

    /// Get the counts of the current window.
    pub fn counts(&self) -> Counts {
        self.shared.lock().counts
    }

    /// Admit a request, returning the generation its result must report
    /// against. Rejected requests never reach the inner chain.
    pub(crate) fn acquire(&self) -> Result<u64> {
        let (outcome, transition) = {
            let mut shared = self.shared.lock();
            let transition = self.advance(&mut shared, Instant::now());
            let outcome = match shared.state {
                CircuitState::Closed => {
                    shared.counts.on_request();
                    Ok(shared.generation)
                }
                CircuitState::Open => Err(HttpClientError::CircuitOpen),
                CircuitState::HalfOpen => {
                    if shared.counts.requests >= self.config.max_requests {
                        Err(HttpClientError::CircuitOpen)
                    } else {
                        shared.counts.on_request();
                        Ok(shared.generation)
                    }
                }
            };
            (outcome, transition)
        };
        self.notify(transition);
        outcome
    }

    /// Record a successful result for a request admitted at `generation`.
    pub(crate) fn on_success(&self, generation: u64) {
        let transition = {
            let mut shared = self.shared.lock();
            let mut transition = self.advance(&mut shared, Instant::now());
            if shared.generation == generation {
                match shared.state {
                    CircuitState::Closed => shared.counts.on_success(),
                    CircuitState::HalfOpen => {
                        shared.counts.on_success();
                        if shared.counts.consecutive_successes >= self.config.max_requests {
                            transition =
                                self.set_state(&mut shared, CircuitState::Closed, Instant::now());
                        }
                    }
                    CircuitState::Open => {}
                }
            }
            transition
        };
        self.notify(transition);
    }

    /// Record a failed result for a request admitted at `generation`.
    pub(crate) fn on_failure(&self, generation: u64) {
        let transition = {
            let mut shared = self.shared.lock();
            let mut transition = self.advance(&mut shared, Instant::now());
            if shared.generation == generation {
                match shared.state {
                    CircuitState::Closed => {
                        shared.counts.on_failure();
                        if (self.config.ready_to_trip)(&shared.counts) {
                            transition =
                                self.set_state(&mut shared, CircuitState::Open, Instant::now());
                        }
                    }
                    CircuitState::HalfOpen => {
                        transition =
                            self.set_state(&mut shared, CircuitState::Open, Instant::now());
                    }
                    CircuitState::Open => {}
                }
            }
            transition
        };
        self.notify(transition);
    }

    /// Force the breaker back to closed and clear all counts.
    pub fn reset(&self) {
        let transition = {
            let mut shared = self.shared.lock();
            if shared.state != CircuitState::Closed {
                self.set_state(&mut shared, CircuitState::Closed, Instant::now())
            } else {
                shared.counts.clear();
                None
            }
        };
        self.notify(transition);
    }

    /// Advance time-driven movements: open → half-open after the timeout,
    /// and closed-window rollover (new generation, cleared counts).
    fn advance(&self, shared: &mut Shared, now: Instant) -> Option<Transition> {
        match shared.state {
            CircuitState::Open => match shared.expiry {
                Some(expiry) if now >= expiry => {
                    self.set_state(shared, CircuitState::HalfOpen, now)
                }
                _ => None,
            },
            CircuitState::Closed => {
                if let Some(expiry) = shared.expiry {
                    if now >= expiry {
                        shared.generation += 1;
                        shared.counts.clear();
                        shared.expiry = Some(now + self.config.interval);
                    }
                }
                None
            }
            CircuitState::HalfOpen => None,
        }
    }

    fn set_state(
        &self,
        shared: &mut Shared,
        to: CircuitState,
        now: Instant,
    ) -> Option<Transition> {
        let from = shared.state;
        if from == to {
            return None;
        }

        shared.state = to;
        shared.generation += 1;
        shared.counts.clear();
        shared.expiry = match to {
            CircuitState::Open => Some(now + self.config.timeout),
            CircuitState::Closed if self.config.interval > Duration::ZERO => {
                Some(now + self.config.interval)
            }
            _ => None,
        };

        match to {
            CircuitState::Open => warn!(breaker = %self.config.name, "Circuit breaker opening"),
            CircuitState::HalfOpen => {
                debug!(breaker = %self.config.name, "Circuit breaker transitioning to half-open")
            }
            CircuitState::Closed => info!(breaker = %self.config.name, "Circuit breaker closing"),
        }

        Some((from, to))
    }

    fn notify(&self, transition: Option<Transition>) {
        if let (Some(handler), Some((from, to))) = (&self.config.on_state_change, transition) {
            handler(&self.config.name, from, to);
        }
    }
}

/// Circuit breaker middleware gating the inner chain.
pub struct CircuitBreakerMiddleware {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerMiddleware {
    /// Create a new circuit breaker middleware.
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

#[async_trait]
impl Middleware for CircuitBreakerMiddleware {
    fn name(&self) -> &'static str {
        "circuit-breaker"
    }

    async fn handle(&self, request: Request, next: &MiddlewareChain) -> Result<Response> {
        let generation = self.breaker.acquire()?;

        match next.next(request).await {
            Ok(response) => {
                let status = response.status().as_u16();
                if self
                    .breaker
                    .config
                    .failure_status_codes
                    .contains(&status)
                {
                    self.breaker.on_failure(generation);
                } else {
                    self.breaker.on_success(generation);
                }
                Ok(response)
            }
            Err(e) => {
                self.breaker.on_failure(generation);
                Err(e)
            }
        }
    }
}
