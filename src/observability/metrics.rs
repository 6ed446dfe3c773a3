//! Metrics collection.
//!
//! # Metrics
//! - `settings_cache_hits_total` (counter): reads served from a fresh snapshot
//! - `settings_cache_stale_served_total` (counter): reads served stale
//! - `settings_fetches_total` (counter): network reads by outcome
//! - `settings_updates_total` (counter): writes by outcome
//! - `settings_rollbacks_total` (counter): optimistic writes undone
//! - `settings_rate_limited_total` (counter): 429 responses
//! - `settings_circuit_transitions_total` (counter): breaker transitions by state
//! - `settings_notifications_total` (counter): change notifications delivered
//!
//! Recording is a no-op until the host installs a `metrics` recorder.

use ::metrics::counter;

pub fn record_cache_hit() {
    counter!("settings_cache_hits_total").increment(1);
}

pub fn record_stale_served() {
    counter!("settings_cache_stale_served_total").increment(1);
}

pub fn record_fetch(outcome: &'static str) {
    counter!("settings_fetches_total", "outcome" => outcome).increment(1);
}

pub fn record_update(outcome: &'static str) {
    counter!("settings_updates_total", "outcome" => outcome).increment(1);
}

pub fn record_rollback() {
    counter!("settings_rollbacks_total").increment(1);
}

pub fn record_rate_limited() {
    counter!("settings_rate_limited_total").increment(1);
}

pub fn record_circuit_transition(state: &'static str) {
    counter!("settings_circuit_transitions_total", "state" => state).increment(1);
}

pub fn record_notification() {
    counter!("settings_notifications_total").increment(1);
}
