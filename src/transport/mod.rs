//! Transport seam to the settings endpoint.
//!
//! # Responsibilities
//! - Define the async contract the cache uses for `GET`/`PATCH /settings`
//! - Report failures as typed [`TransportError`]s
//!
//! # Design Decisions
//! - No retries here; backoff is owned by the breaker and rate-limit tracker
//! - Status, `Retry-After` and body are preserved so the cache can classify

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::settings::{Settings, SettingsPatch};

pub use http::HttpTransport;

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Server-provided `Retry-After`, if any.
        retry_after: Option<Duration>,
    },

    /// Body was not a valid settings document.
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Remote settings resource.
#[async_trait]
pub trait SettingsTransport: Send + Sync {
    /// `GET /settings`.
    async fn fetch_settings(&self) -> Result<Settings, TransportError>;

    /// `PATCH /settings` with `patch`; `expected_version` lets the server
    /// detect concurrent writes.
    async fn patch_settings(
        &self,
        patch: &SettingsPatch,
        expected_version: Option<u64>,
    ) -> Result<Settings, TransportError>;
}
