//! Circuit breaker for the settings endpoint.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: endpoint assumed down, requests fail fast
//! - Half-Open: testing if endpoint recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first caller after the cooldown
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails (cooldown restarts)
//! any → Closed: operator reset
//! ```
//!
//! # Design Decisions
//! - Fail fast in Open state (no network call)
//! - Single trial in Half-Open (prevents hammering a recovering endpoint)
//! - Only network/5xx outcomes count; 4xx and 429 release the trial slot
//!   without changing state

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::CircuitBreakerConfig;
use crate::error::{SettingsError, SettingsResult};
use crate::observability::metrics;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Epoch milliseconds at which the circuit last opened.
    pub opened_at: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    public: CircuitBreakerState,
    trial_in_flight: bool,
}

/// Failure-counting gate in front of the settings endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                public: CircuitBreakerState {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                },
                trial_in_flight: false,
            }),
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn state(&self) -> CircuitBreakerState {
        self.lock().public.clone()
    }

    /// Milliseconds left in the open cooldown, or `None` once it has elapsed.
    fn cooling_for(&self, inner: &Inner, now: u64) -> Option<u64> {
        let opened_at = inner.public.opened_at.unwrap_or(0);
        let elapsed = now.saturating_sub(opened_at);
        let cooldown = self.cooldown.as_millis() as u64;
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Reject if the circuit is open and still cooling down. Does not claim
    /// the half-open trial.
    pub fn check(&self) -> SettingsResult<()> {
        let inner = self.lock();
        if inner.public.state == CircuitState::Open {
            if let Some(retry_after_ms) = self.cooling_for(&inner, self.clock.now_millis()) {
                return Err(SettingsError::CircuitOpen { retry_after_ms });
            }
        }
        Ok(())
    }

    /// Admit one request. Moves an open circuit whose cooldown elapsed to
    /// half-open and hands this caller the single trial.
    pub fn try_acquire(&self) -> SettingsResult<()> {
        let mut inner = self.lock();
        match inner.public.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                if let Some(retry_after_ms) = self.cooling_for(&inner, self.clock.now_millis()) {
                    return Err(SettingsError::CircuitOpen { retry_after_ms });
                }
                inner.public.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                tracing::info!("Circuit breaker half-open, allowing trial request");
                metrics::record_circuit_transition(CircuitState::HalfOpen.as_str());
                Ok(())
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(SettingsError::CircuitOpen { retry_after_ms: 0 })
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Report a successful request.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        let previous = inner.public.state;
        inner.public = CircuitBreakerState {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        };
        inner.trial_in_flight = false;

        if previous != CircuitState::Closed {
            tracing::info!(previous = previous.as_str(), "Circuit breaker closed");
            metrics::record_circuit_transition(CircuitState::Closed.as_str());
        }
    }

    /// Report a breaker-countable failure (network, 5xx, undecodable body).
    pub fn record_failure(&self) {
        let now = self.clock.now_millis();
        let mut inner = self.lock();
        inner.public.consecutive_failures = inner.public.consecutive_failures.saturating_add(1);
        let failures = inner.public.consecutive_failures;

        let should_open = match inner.public.state {
            CircuitState::Closed => failures >= self.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        inner.trial_in_flight = false;

        if should_open {
            inner.public.state = CircuitState::Open;
            inner.public.opened_at = Some(now);
            tracing::warn!(
                consecutive_failures = failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            );
            metrics::record_circuit_transition(CircuitState::Open.as_str());
        } else {
            tracing::debug!(consecutive_failures = failures, "Circuit breaker recorded failure");
        }
    }

    /// Report an outcome that says nothing about endpoint health (4xx, 429).
    /// Frees the half-open trial slot without changing state.
    pub fn release(&self) {
        self.lock().trial_in_flight = false;
    }

    /// Operator reset: close the circuit and forget failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.public = CircuitBreakerState {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        };
        inner.trial_in_flight = false;
        tracing::info!("Circuit breaker manually reset");
        metrics::record_circuit_transition(CircuitState::Closed.as_str());
    }
}
