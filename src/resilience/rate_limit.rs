//! Cooperative backoff after server rate limiting.
//!
//! # Responsibilities
//! - Record 429-class responses and compute the local cooldown
//! - Reject requests synchronously while the cooldown runs
//! - Clear on the first non-rate-limited response
//!
//! # Design Decisions
//! - Independent of the circuit breaker: a 429 means "slow down", not "down"
//! - Cooldown doubles per consecutive 429 (capped); a larger server
//!   `Retry-After` wins

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::error::{SettingsError, SettingsResult};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Observable rate-limit state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    pub is_rate_limited: bool,
    /// Epoch milliseconds until which requests are suppressed.
    pub rate_limited_until: Option<u64>,
    pub consecutive_rate_limits: u32,
}

/// Tracks server-imposed cooldowns.
#[derive(Debug)]
pub struct RateLimitTracker {
    state: Mutex<RateLimitState>,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
    clock: Arc<dyn Clock>,
}

impl RateLimitTracker {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RateLimitState::default()),
            base_backoff_ms: config.base_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateLimitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RateLimitState {
        self.lock().clone()
    }

    /// Reject while a cooldown is running.
    pub fn check(&self) -> SettingsResult<()> {
        let state = self.lock();
        if !state.is_rate_limited {
            return Ok(());
        }
        let now = self.clock.now_millis();
        match state.rate_limited_until {
            Some(until) if now < until => Err(SettingsError::RateLimited {
                retry_after_ms: until - now,
            }),
            _ => Ok(()),
        }
    }

    /// Record a 429 and return the resulting error for the caller.
    pub fn record_rate_limited(&self, retry_after_hint: Option<Duration>) -> SettingsError {
        let now = self.clock.now_millis();
        let mut state = self.lock();
        state.consecutive_rate_limits = state.consecutive_rate_limits.saturating_add(1);

        let backoff = calculate_backoff(
            state.consecutive_rate_limits,
            self.base_backoff_ms,
            self.max_backoff_ms,
        );
        let cooldown = backoff.max(retry_after_hint.unwrap_or_default());
        let cooldown_ms = cooldown.as_millis() as u64;

        state.is_rate_limited = true;
        state.rate_limited_until = Some(now + cooldown_ms);

        tracing::warn!(
            consecutive = state.consecutive_rate_limits,
            cooldown_ms,
            "Settings endpoint rate limited"
        );
        metrics::record_rate_limited();

        SettingsError::RateLimited {
            retry_after_ms: cooldown_ms,
        }
    }

    /// Record any response that was not rate limited.
    pub fn record_response(&self) {
        let mut state = self.lock();
        if state.is_rate_limited || state.consecutive_rate_limits > 0 {
            tracing::info!("Rate limit cleared");
        }
        *state = RateLimitState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tracker() -> (RateLimitTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = RateLimitConfig {
            base_backoff_ms: 1_000,
            max_backoff_ms: 8_000,
        };
        (RateLimitTracker::new(&config, clock.clone()), clock)
    }

    #[test]
    fn test_cooldown_doubles_and_caps() {
        let (tracker, _clock) = tracker();
        let expected = [1_000, 2_000, 4_000, 8_000, 8_000];
        for ms in expected {
            assert_eq!(
                tracker.record_rate_limited(None),
                SettingsError::RateLimited { retry_after_ms: ms }
            );
        }
        assert_eq!(tracker.state().consecutive_rate_limits, 5);
    }

    #[test]
    fn test_rejects_until_cooldown_elapses() {
        let (tracker, clock) = tracker();
        assert!(tracker.check().is_ok());

        tracker.record_rate_limited(None);
        clock.advance(Duration::from_millis(400));
        assert_eq!(
            tracker.check(),
            Err(SettingsError::RateLimited {
                retry_after_ms: 600
            })
        );

        clock.advance(Duration::from_millis(600));
        assert!(tracker.check().is_ok());
        // Flag stays set until a response clears it.
        assert!(tracker.state().is_rate_limited);
    }

    #[test]
    fn test_server_hint_extends_cooldown() {
        let (tracker, _clock) = tracker();
        let err = tracker.record_rate_limited(Some(Duration::from_secs(5)));
        assert_eq!(err, SettingsError::RateLimited { retry_after_ms: 5_000 });
        assert_eq!(tracker.state().rate_limited_until, Some(5_000));
    }

    #[test]
    fn test_response_resets() {
        let (tracker, _clock) = tracker();
        tracker.record_rate_limited(None);
        tracker.record_rate_limited(None);

        tracker.record_response();
        assert_eq!(tracker.state(), RateLimitState::default());

        // Escalation starts over.
        assert_eq!(
            tracker.record_rate_limited(None),
            SettingsError::RateLimited {
                retry_after_ms: 1_000
            }
        );
    }
}
