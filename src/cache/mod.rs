//! Settings cache subsystem.
//!
//! # Data Flow
//! ```text
//! reader → fetch.rs ─┬→ store.rs (fresh / stale-while-revalidate)
//!                    └→ one shared network read → store.rs publish
//!
//! writer → optimistic.rs → store.rs optimistic publish
//!                        → transport PATCH
//!                        → canonical publish + notifications | rollback
//! ```
//!
//! # Design Decisions
//! - `store.rs` is the only owner of the live snapshot
//! - Reads and writes share the breaker and rate-limit tracker

pub mod fetch;
pub mod optimistic;
pub mod store;

pub use fetch::{FetchMetadata, FetchOptions, FetchOrchestrator, FetchResult};
pub use optimistic::{
    OptimisticUpdateManager, PendingOptimisticUpdate, UpdateOptions, UpdateOutcome,
};
pub use store::{CacheState, CacheStatus, CacheStore, Lookup};
