//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the settings
//! client. All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the settings client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Settings endpoint and credentials.
    pub api: ApiConfig,

    /// Freshness window of the cached snapshot.
    pub cache: CacheConfig,

    /// Circuit breaker tuning.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Rate-limit cooldown tuning.
    pub rate_limit: RateLimitConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Settings endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the admin API (e.g., "https://admin.example.org/api").
    pub base_url: String,

    /// Path of the settings resource below `base_url`.
    pub settings_path: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Optional bearer token.
    pub auth_token: Option<String>,

    /// Name recorded on change notifications when the server does not
    /// report an audit user.
    pub operator: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            settings_path: "/settings".to_string(),
            timeout_secs: 10,
            auth_token: None,
            operator: None,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot time-to-live in seconds.
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial request.
    pub cooldown_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
        }
    }
}

/// Rate-limit cooldown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Cooldown after the first 429 in milliseconds; doubles per repeat.
    pub base_backoff_ms: u64,

    /// Upper bound for the cooldown in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
