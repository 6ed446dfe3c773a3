//! Resilient settings cache.
//!
//! A shared, single-flight, optimistically-updatable cache over the remote
//! system settings resource (pricing, tax and notification routing).
//!
//! # Architecture Overview
//!
//! ```text
//!   UI bindings
//!       │  load_settings / update_settings / on_settings_change
//!       ▼
//!   ┌──────────────────────────── service ────────────────────────────┐
//!   │                                                                 │
//!   │   settings::validation ──▶ cache::optimistic ──┐                │
//!   │                                                ├─▶ cache::store │
//!   │   cache::fetch (single-flight) ────────────────┘                │
//!   │        │            │                                           │
//!   │        ▼            ▼                                           │
//!   │   resilience::circuit_breaker   resilience::rate_limit          │
//!   │        │                                                        │
//!   │        ▼                                                        │
//!   │   transport (reqwest)            notifications::bus ──▶ UI      │
//!   └─────────────────────────────────────────────────────────────────┘
//! ```

// Domain
pub mod error;
pub mod settings;

// Core subsystems
pub mod cache;
pub mod notifications;
pub mod resilience;
pub mod transport;

// Cross-cutting concerns
pub mod clock;
pub mod config;
pub mod observability;

pub mod service;

pub use config::ClientConfig;
pub use error::{SettingsError, SettingsResult};
pub use service::{CacheStatusReport, Feedback, LogFeedback, SettingsService};
pub use settings::{SettingValue, Settings, SettingsField, SettingsPatch};
