//! Change notification subsystem.
//!
//! # Data Flow
//! ```text
//! confirmed write (cache::optimistic)
//!     → one ChangeNotification per field whose value changed
//!     → bus.rs fan-out → UI bindings re-render
//! ```
//!
//! # Design Decisions
//! - Only server-confirmed changes are announced; optimistic values are not
//! - Delivery is synchronous and isolated per subscriber

pub mod bus;

pub use bus::{ChangeCallback, ChangeNotification, NotificationBus, Subscription};
