//! Error taxonomy of the settings cache.

use thiserror::Error;

use crate::settings::ValidationReport;
use crate::transport::TransportError;

/// Every failure the cache surfaces to callers.
///
/// `Clone` because one single-flight fetch result is handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Field-level validation failed; nothing was sent.
    #[error("Please fix validation errors")]
    Validation(ValidationReport),

    /// Server asked us to back off; no request was sent or the request got 429.
    #[error("Too many requests - retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// Breaker is open; request failed fast.
    #[error("Settings service unavailable - retry in {retry_after_ms} ms or reset")]
    CircuitOpen { retry_after_ms: u64 },

    /// Settings changed concurrently (version mismatch).
    #[error("Settings were changed by someone else: {message}")]
    Conflict {
        expected_version: Option<u64>,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request refused for a reason other than conflict or rate limiting (4xx).
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

impl SettingsError {
    /// Translate a transport failure into the taxonomy.
    pub fn from_transport(err: TransportError, expected_version: Option<u64>) -> Self {
        match err {
            TransportError::Network(message) => SettingsError::Network(message),
            TransportError::Decode(message) => SettingsError::InvalidResponse(message),
            TransportError::Status {
                status,
                body,
                retry_after,
            } => match status {
                409 => SettingsError::Conflict {
                    expected_version,
                    message: body,
                },
                429 => SettingsError::RateLimited {
                    retry_after_ms: retry_after.map(|d| d.as_millis() as u64).unwrap_or(0),
                },
                500..=599 => SettingsError::Server {
                    status,
                    message: body,
                },
                _ => SettingsError::Rejected {
                    status,
                    message: body,
                },
            },
        }
    }

    /// Whether this outcome says something about server health.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self,
            SettingsError::Network(_)
                | SettingsError::Server { .. }
                | SettingsError::InvalidResponse(_)
        )
    }

    /// Whether the UI should offer a retry affordance.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SettingsError::Validation(_) | SettingsError::Rejected { .. }
        )
    }

    /// Field-scoped validation report, if any.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            SettingsError::Validation(report) => Some(report),
            _ => None,
        }
    }
}
