//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `api.base_url`.
pub const ENV_API_URL: &str = "SETTINGS_API_URL";
/// Environment variable overriding `api.auth_token`.
pub const ENV_API_TOKEN: &str = "SETTINGS_API_TOKEN";
/// Environment variable overriding `observability.log_level`.
pub const ENV_LOG_LEVEL: &str = "SETTINGS_LOG_LEVEL";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Apply `SETTINGS_*` overrides from the process environment, then
/// re-validate.
pub fn apply_env_overrides(config: ClientConfig) -> Result<ClientConfig, ConfigError> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides from an arbitrary lookup (the environment in production).
pub fn apply_overrides<F>(mut config: ClientConfig, lookup: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_API_URL) {
        config.api.base_url = url;
    }
    if let Some(token) = lookup(ENV_API_TOKEN) {
        config.api.auth_token = Some(token);
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.observability.log_level = level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
