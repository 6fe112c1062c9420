//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use broker::{CircuitBreakerConfig, RetryPolicy};
use saga::CoordinatorConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `PUBLISH_MAX_ATTEMPTS`: attempts per publish, including the first (default: `5`)
/// - `PUBLISH_INITIAL_BACKOFF_MS`: delay before the first retry (default: `50`)
/// - `PUBLISH_MAX_BACKOFF_MS`: upper bound for a retry delay (default: `2000`)
/// - `CIRCUIT_FAILURE_THRESHOLD`: exhausted publishes before the circuit opens (default: `5`)
/// - `CIRCUIT_COOLDOWN_MS`: how long an open circuit rejects publishes (default: `5000`)
/// - `SAGA_TIMEOUT_SECS`: in-flight saga deadline (default: unset, sagas never expire)
/// - `SAGA_SWEEP_INTERVAL_SECS`: how often expired sagas are looked for (default: `5`)
/// - `PAYMENT_MAX_AMOUNT`: largest amount a single payment accepts (default: unset)
/// - `CONSUMER_CONCURRENCY`: messages handled at once per topic (default: `16`)
///
/// Unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub publish_max_attempts: u32,
    pub publish_initial_backoff: Duration,
    pub publish_max_backoff: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown: Duration,
    pub saga_timeout: Option<Duration>,
    pub saga_sweep_interval: Duration,
    pub payment_max_amount: Option<i64>,
    pub consumer_concurrency: usize,
}

fn var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: var("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            publish_max_attempts: var("PUBLISH_MAX_ATTEMPTS")
                .unwrap_or(defaults.publish_max_attempts),
            publish_initial_backoff: var("PUBLISH_INITIAL_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_initial_backoff),
            publish_max_backoff: var("PUBLISH_MAX_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_max_backoff),
            circuit_failure_threshold: var("CIRCUIT_FAILURE_THRESHOLD")
                .unwrap_or(defaults.circuit_failure_threshold),
            circuit_cooldown: var("CIRCUIT_COOLDOWN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.circuit_cooldown),
            saga_timeout: var("SAGA_TIMEOUT_SECS").map(Duration::from_secs),
            saga_sweep_interval: var("SAGA_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.saga_sweep_interval),
            payment_max_amount: var("PAYMENT_MAX_AMOUNT"),
            consumer_concurrency: var("CONSUMER_CONCURRENCY")
                .unwrap_or(defaults.consumer_concurrency),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the retry policy for every publisher.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.publish_max_attempts,
            initial_backoff: self.publish_initial_backoff,
            max_backoff: self.publish_max_backoff,
            ..RetryPolicy::default()
        }
    }

    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_failure_threshold,
            cooldown: self.circuit_cooldown,
        }
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            saga_timeout: self.saga_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let breaker = CircuitBreakerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            publish_max_attempts: retry.max_attempts,
            publish_initial_backoff: retry.initial_backoff,
            publish_max_backoff: retry.max_backoff,
            circuit_failure_threshold: breaker.failure_threshold,
            circuit_cooldown: breaker.cooldown,
            saga_timeout: None,
            saga_sweep_interval: Duration::from_secs(5),
            payment_max_amount: None,
            consumer_concurrency: 16,
        }
    }
}
