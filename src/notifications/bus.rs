//! Per-field change fan-out.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;
use crate::settings::{SettingValue, SettingsField};

/// One confirmed change of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeNotification {
    pub field: SettingsField,
    /// `None` when nothing was cached before the write.
    pub old_value: Option<SettingValue>,
    pub new_value: SettingValue,
    /// Epoch milliseconds of confirmation.
    pub timestamp: u64,
    /// Audit user reported by the server, else the configured operator.
    pub user: Option<String>,
}

/// Subscriber callback.
pub type ChangeCallback = Arc<dyn Fn(&ChangeNotification) + Send + Sync>;

type Subscribers = DashMap<u64, ChangeCallback>;

/// Fan-out of change notifications to UI bindings.
#[derive(Default)]
pub struct NotificationBus {
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`; it stays registered until the returned
    /// [`Subscription`] is unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeNotification) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, Arc::new(callback));
        tracing::debug!(subscriber = id, "Settings change subscriber added");
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `notification` to every current subscriber, in subscription
    /// order. A panicking subscriber is logged and skipped. Returns the
    /// number of successful deliveries.
    pub fn publish(&self, notification: &ChangeNotification) -> usize {
        // Snapshot first so callbacks may (un)subscribe without deadlocking
        // on a shard lock.
        let mut targets: Vec<(u64, ChangeCallback)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        targets.sort_by_key(|(id, _)| *id);

        let mut delivered = 0;
        for (id, callback) in targets {
            match catch_unwind(AssertUnwindSafe(|| callback(notification))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!(
                    subscriber = id,
                    field = %notification.field,
                    "Settings change subscriber panicked"
                ),
            }
        }
        metrics::record_notification();
        delivered
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Remove this subscription's callback. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if subscribers.remove(&self.id).is_some() {
                tracing::debug!(subscriber = self.id, "Settings change subscriber removed");
            }
        }
    }
}
