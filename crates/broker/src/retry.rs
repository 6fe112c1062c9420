//! Bounded retry with exponential backoff and a circuit breaker for publishing.
//!
//! A transient broker error must never take down the process that publishes:
//! the publisher retries with backoff, gives up after a bounded number of
//! attempts, and after repeated give-ups stops trying for a cooldown period.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Broker, BrokerError, Result, Subscription};

/// How many times a publish is attempted and how long to wait between tries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor applied to the delay after each failed retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Returns the delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Thresholds for the circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive exhausted publishes that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial publish is allowed.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(5),
        }
    }
}

/// The state of a circuit breaker.
///
/// State transitions:
/// ```text
/// Closed ──(threshold failures)──► Open ──(cooldown)──► HalfOpen ──┬──(success)──► Closed
///                                   ▲                               │
///                                   └───────────(failure)───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Default)]
struct BreakerInner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// When the single half-open trial was handed out.
    trial_started: Option<Instant>,
}

/// Stops publish attempts for a while after repeated failures.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Returns the current state.
    pub async fn state(&self) -> CircuitState {
        let inner = self.inner.lock().await;
        self.state_of(&inner)
    }

    /// Returns true if a publish may be attempted now.
    ///
    /// While half-open only one caller at a time gets the trial. A trial that
    /// never reports back is given up after another cooldown.
    pub async fn allow(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match self.state_of(&inner) {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let trial_pending = inner
                    .trial_started
                    .is_some_and(|started| started.elapsed() < self.config.cooldown);
                if trial_pending {
                    return false;
                }
                inner.trial_started = Some(Instant::now());
                true
            }
        }
    }

    /// Records a successful publish, closing the circuit.
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.opened_at.is_some() {
            tracing::info!("circuit closed after successful publish");
        }
        *inner = BreakerInner::default();
    }

    /// Records an exhausted publish, opening the circuit at the threshold.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let half_open = self.state_of(&inner) == CircuitState::HalfOpen;
        if half_open || inner.consecutive_failures >= self.config.failure_threshold.max(1) {
            inner.opened_at = Some(Instant::now());
            inner.trial_started = None;
            metrics::counter!("broker_circuit_opened_total").increment(1);
            tracing::warn!(
                consecutive_failures = inner.consecutive_failures,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "circuit opened"
            );
        }
    }

    fn state_of(&self, inner: &BreakerInner) -> CircuitState {
        match inner.opened_at {
            None => CircuitState::Closed,
            Some(opened_at) if opened_at.elapsed() >= self.config.cooldown => {
                CircuitState::HalfOpen
            }
            Some(_) => CircuitState::Open,
        }
    }
}

/// Wraps a broker so that publishes are retried and guarded by a circuit breaker.
///
/// Subscriptions pass through to the wrapped broker unchanged.
#[derive(Debug, Clone)]
pub struct RetryingPublisher<B> {
    inner: B,
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl<B: Broker> RetryingPublisher<B> {
    pub fn new(inner: B, policy: RetryPolicy, breaker: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            policy,
            breaker: Arc::new(CircuitBreaker::new(breaker)),
        }
    }

    /// Returns the circuit breaker guarding this publisher.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<B: Broker> Broker for RetryingPublisher<B> {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if !self.breaker.allow().await {
            metrics::counter!("broker_publish_rejected_total").increment(1);
            return Err(BrokerError::CircuitOpen {
                topic: topic.to_string(),
            });
        }

        let max_attempts = self.policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.publish(topic, payload.clone()).await {
                Ok(()) => {
                    self.breaker.record_success().await;
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.backoff_for(attempt);
                    metrics::counter!("broker_publish_retries_total").increment(1);
                    tracing::warn!(
                        topic,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.breaker.record_failure().await;
                    metrics::counter!("broker_publish_failures_total").increment(1);
                    tracing::error!(topic, attempts = attempt, error = %e, "publish failed");
                    return Err(BrokerError::RetriesExhausted {
                        topic: topic.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        self.inner.subscribe(topic).await
    }
}
