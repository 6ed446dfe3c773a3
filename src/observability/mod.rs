//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! breaker / tracker / cache / updates produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters)
//! ```
//!
//! # Design Decisions
//! - Structured fields (state, version, correlation id) over formatted strings
//! - Metrics are cheap no-ops unless the host installs a recorder

pub mod logging;
pub mod metrics;
