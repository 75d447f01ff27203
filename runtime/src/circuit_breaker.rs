//! Circuit breaker for fail-fast protection of the payment provider.
//!
//! A hung or erroring provider must not drag every booking request through
//! a full timeout-and-retry cycle. The breaker counts consecutive failures
//! and, past a threshold, rejects calls immediately for a cooldown period
//! before probing for recovery.
//!
//! # States
//!
//! - **Closed**: normal operation; failures are counted
//! - **Open**: failure threshold reached; calls are rejected until the
//!   cooldown elapses
//! - **HalfOpen**: cooldown elapsed; a limited number of probe calls decide
//!   whether to close again or reopen
//!
//! # Example
//!
//! ```rust
//! use courtside_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::builder()
//!         .failure_threshold(5)
//!         .cooldown(Duration::from_secs(30))
//!         .success_threshold(2)
//!         .build(),
//! );
//!
//! match breaker.call(|| async { Ok::<_, String>("intent-123") }).await {
//!     Ok(provider_ref) => tracing::info!(%provider_ref, "provider call succeeded"),
//!     Err(e) => tracing::warn!("provider call failed: {e}"),
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long to reject calls before probing for recovery
    pub cooldown: Duration,
    /// Successful probes required to close the circuit again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Consecutive failures before the circuit opens.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// How long the circuit stays open before probing.
    #[must_use]
    pub const fn cooldown(mut self, duration: Duration) -> Self {
        self.config.cooldown = duration;
        self
    }

    /// Successful probes required to close the circuit.
    #[must_use]
    pub const fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> CircuitBreakerConfig {
        self.config
    }
}

/// Observable circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls pass through normally
    Closed,
    /// Calls are rejected immediately
    Open,
    /// Probing for recovery
    HalfOpen,
}

/// Errors from circuit breaker operations.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, call rejected without reaching the provider
    #[error("circuit breaker is open")]
    Open,
    /// The wrapped operation failed
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

/// Circuit breaker wrapping calls to an unreliable dependency.
///
/// Cloning is cheap; clones share the same breaker state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner::Closed { failures: 0 })),
        }
    }

    /// Get the current state of the circuit breaker.
    pub async fn state(&self) -> State {
        match *self.inner.lock().await {
            Inner::Closed { .. } => State::Closed,
            Inner::Open { .. } => State::Open,
            Inner::HalfOpen { .. } => State::HalfOpen,
        }
    }

    /// Call an operation through the circuit breaker.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without invoking the operation
    /// if the circuit is open, or [`CircuitBreakerError::Inner`] if the
    /// operation itself fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            tracing::warn!("circuit breaker open, rejecting call");
            return Err(CircuitBreakerError::Open);
        }

        match operation().await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            },
            Err(err) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(err))
            },
        }
    }

    /// Decide whether a call may proceed, transitioning Open -> HalfOpen
    /// once the cooldown has elapsed.
    async fn admit(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match *inner {
            Inner::Closed { .. } | Inner::HalfOpen { .. } => true,
            Inner::Open { since } => {
                if since.elapsed() >= self.config.cooldown {
                    tracing::info!("circuit breaker cooldown elapsed, probing (open -> half-open)");
                    *inner = Inner::HalfOpen { successes: 0 };
                    true
                } else {
                    false
                }
            },
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match *inner {
            Inner::Closed { .. } => {
                *inner = Inner::Closed { failures: 0 };
            },
            Inner::HalfOpen { successes } => {
                let successes = successes + 1;
                if successes >= self.config.success_threshold {
                    tracing::info!(successes, "circuit breaker recovered (half-open -> closed)");
                    *inner = Inner::Closed { failures: 0 };
                } else {
                    *inner = Inner::HalfOpen { successes };
                }
            },
            Inner::Open { .. } => {},
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match *inner {
            Inner::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    tracing::warn!(
                        failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker tripped (closed -> open)"
                    );
                    *inner = Inner::Open {
                        since: Instant::now(),
                    };
                } else {
                    *inner = Inner::Closed { failures };
                }
            },
            Inner::HalfOpen { .. } => {
                tracing::warn!("recovery probe failed (half-open -> open)");
                *inner = Inner::Open {
                    since: Instant::now(),
                };
            },
            Inner::Open { .. } => {},
        }
    }

    /// Reset the circuit breaker to closed state.
    ///
    /// For tests and manual operator intervention.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        *inner = Inner::Closed { failures: 0 };
    }
}
