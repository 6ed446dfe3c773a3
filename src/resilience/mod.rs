//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to settings endpoint:
//!     → circuit_breaker.rs (fail fast while open, single half-open trial)
//!     → rate_limit.rs (fail fast during server-imposed cooldown)
//!     → transport
//!     → outcome reported back: network/5xx → breaker, 429 → tracker
//! ```
//!
//! # Design Decisions
//! - Two independent state machines instead of transport-level retries
//! - Both recover on wall-clock time alone; the breaker also has a manual reset
//! - All checks are synchronous and never touch the network

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitState};
pub use rate_limit::{RateLimitState, RateLimitTracker};

use std::time::Duration;

use crate::error::SettingsError;

/// Report a failed request to both state machines and return the error the
/// caller should see.
///
/// - 429 → rate-limit tracker (breaker trial released, failure not counted)
/// - network failure → breaker failure; no response, so the tracker is left alone
/// - 5xx / undecodable body → breaker failure, tracker cleared
/// - 409 / other 4xx → breaker untouched, tracker cleared
pub fn settle_failure(
    breaker: &CircuitBreaker,
    tracker: &RateLimitTracker,
    error: SettingsError,
) -> SettingsError {
    match error {
        SettingsError::RateLimited { retry_after_ms } => {
            breaker.release();
            let hint = (retry_after_ms > 0).then(|| Duration::from_millis(retry_after_ms));
            tracker.record_rate_limited(hint)
        }
        SettingsError::Network(_) => {
            breaker.record_failure();
            error
        }
        error => {
            tracker.record_response();
            if error.counts_against_breaker() {
                breaker.record_failure();
            } else {
                breaker.release();
            }
            error
        }
    }
}
