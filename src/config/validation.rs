//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the endpoint URL and value ranges (timeouts > 0, backoff bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use url::Url;

use crate::config::schema::ClientConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending key (e.g., "cache.ttl_secs").
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.api.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "api.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "api.base_url",
            format!("invalid URL: {}", e),
        )),
    }

    if config.api.timeout_secs == 0 {
        errors.push(ValidationError::new("api.timeout_secs", "must be greater than 0"));
    }

    if config.cache.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.ttl_secs", "must be greater than 0"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be at least 1",
        ));
    }

    if config.circuit_breaker.cooldown_secs == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.cooldown_secs",
            "must be greater than 0",
        ));
    }

    if config.rate_limit.base_backoff_ms == 0 {
        errors.push(ValidationError::new(
            "rate_limit.base_backoff_ms",
            "must be greater than 0",
        ));
    }

    if config.rate_limit.max_backoff_ms < config.rate_limit.base_backoff_ms {
        errors.push(ValidationError::new(
            "rate_limit.max_backoff_ms",
            "must not be smaller than base_backoff_ms",
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
