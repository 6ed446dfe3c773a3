//! User-visible feedback surface.

use std::fmt::Debug;

/// Toast-style sink for outcomes of the bool-returning service calls.
pub trait Feedback: Send + Sync + Debug {
    fn info(&self, message: &str);

    /// `retryable` tells the UI whether to offer a retry affordance.
    fn error(&self, message: &str, retryable: bool);
}

/// Default sink: writes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn info(&self, message: &str) {
        tracing::info!(target: "settings_cache::feedback", "{}", message);
    }

    fn error(&self, message: &str, retryable: bool) {
        tracing::warn!(target: "settings_cache::feedback", retryable, "{}", message);
    }
}
