//! Exponential cooldown calculation.

use std::time::Duration;

/// Cooldown for the `attempt`-th consecutive rate limit: `base · 2^(attempt-1)`,
/// capped at `max_ms`. No jitter, so cooldowns are reproducible.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    Duration::from_millis(delay_ms.min(max_ms))
}
