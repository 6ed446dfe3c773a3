//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable by `RUST_LOG`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Build the filter: `RUST_LOG` wins, otherwise the configured level for this
/// crate and `warn` for dependencies.
pub fn build_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "settings_cache={level},settings_cli={level},warn",
            level = config.log_level.to_ascii_lowercase()
        )
        .into()
    })
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let result = tracing_subscriber::registry()
        .with(build_filter(config))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}
