//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → SETTINGS_* environment overrides
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → SettingsService::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env_overrides, load_config, ConfigError};
pub use schema::{
    ApiConfig, CacheConfig, CircuitBreakerConfig, ClientConfig, ObservabilityConfig,
    RateLimitConfig,
};
