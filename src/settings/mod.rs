//! Settings domain model.
//!
//! # Data Flow
//! ```text
//! GET /settings   → Settings (serde) → ConfigurationSnapshot (immutable, Arc)
//! user edit       → SettingsPatch → validation.rs → optimistic snapshot
//! PATCH /settings → Settings (canonical) → replaces optimistic snapshot
//! ```
//!
//! # Design Decisions
//! - Pricing values stay decimal strings end to end (no float drift)
//! - Snapshots are never mutated; every change builds a new one
//! - Validation is pure and runs before anything touches the cache

pub mod types;
pub mod validation;

pub use types::{
    ConfigurationSnapshot, FieldKind, SettingValue, Settings, SettingsField, SettingsPatch,
    UnknownField,
};
pub use validation::{validate_field, validate_patch, FieldCheck, FieldSuggestion, ValidationReport};
