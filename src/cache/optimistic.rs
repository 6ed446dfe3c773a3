//! Optimistic writer.
//!
//! # Responsibilities
//! - Publish the proposed value before the server answers
//! - Replace it with the server's canonical document on success
//! - Restore the exact pre-write state on failure
//! - Announce confirmed per-field changes on the notification bus
//!
//! # Design Decisions
//! - Writes are serialized on an async mutex, so a rollback always restores
//!   the state that preceded its own write
//! - The write runs in a spawned task that owns the lock guard; a caller that
//!   stops awaiting does not abandon a half-applied optimistic snapshot
//! - A version conflict rolls back and invalidates instead of merging

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::cache::store::{CacheState, CacheStore};
use crate::clock::Clock;
use crate::error::{SettingsError, SettingsResult};
use crate::notifications::{ChangeNotification, NotificationBus};
use crate::observability::metrics;
use crate::resilience::{settle_failure, CircuitBreaker, RateLimitTracker};
use crate::settings::{validate_patch, ConfigurationSnapshot, SettingsPatch};
use crate::transport::SettingsTransport;

/// Write options.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Trust the caller's values; the server still validates.
    pub skip_validation: bool,
}

/// Confirmed write.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Canonical snapshot now held by the store.
    pub snapshot: Arc<ConfigurationSnapshot>,
    /// Notifications delivered for this write, in field order.
    pub changes: Vec<ChangeNotification>,
    pub correlation_id: Uuid,
}

/// The write currently awaiting the server.
#[derive(Debug, Clone, Serialize)]
pub struct PendingOptimisticUpdate {
    pub correlation_id: Uuid,
    pub diff: SettingsPatch,
    /// Store state immediately before the optimistic publish.
    #[serde(skip)]
    pub rollback: Arc<CacheState>,
    pub started_at: u64,
}

struct UpdateShared {
    store: Arc<CacheStore>,
    breaker: Arc<CircuitBreaker>,
    rate_limit: Arc<RateLimitTracker>,
    transport: Arc<dyn SettingsTransport>,
    bus: Arc<NotificationBus>,
    clock: Arc<dyn Clock>,
    operator: Option<String>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    pending: Mutex<Option<PendingOptimisticUpdate>>,
}

impl UpdateShared {
    fn set_pending(&self, pending: Option<PendingOptimisticUpdate>) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = pending;
    }

    async fn apply(
        &self,
        patch: SettingsPatch,
        _guard: OwnedMutexGuard<()>,
    ) -> SettingsResult<UpdateOutcome> {
        self.breaker.check()?;
        self.rate_limit.check()?;
        self.breaker.try_acquire()?;

        let correlation_id = Uuid::new_v4();
        let checkpoint = self.store.state();
        let base = checkpoint.snapshot.clone();

        if let Some(base) = &base {
            match base.with_patch(&patch) {
                Ok(optimistic) => self.store.publish_write(Arc::new(optimistic)),
                Err(e) => {
                    self.breaker.release();
                    return Err(e);
                }
            }
        }

        self.set_pending(Some(PendingOptimisticUpdate {
            correlation_id,
            diff: patch.clone(),
            rollback: Arc::clone(&checkpoint),
            started_at: self.clock.now_millis(),
        }));
        tracing::debug!(
            correlation_id = %correlation_id,
            fields = patch.len(),
            optimistic = base.is_some(),
            "Submitting settings update"
        );

        let expected_version = base.as_ref().map(|b| b.version());
        let result = self.transport.patch_settings(&patch, expected_version).await;
        self.set_pending(None);

        match result {
            Ok(settings) => {
                let now = self.clock.now_millis();
                let canonical = Arc::new(ConfigurationSnapshot::new(settings, now));
                self.store.publish_write(Arc::clone(&canonical));
                self.breaker.record_success();
                self.rate_limit.record_response();

                let user = canonical
                    .settings
                    .updated_by
                    .clone()
                    .or_else(|| self.operator.clone());
                let changes: Vec<ChangeNotification> = match &base {
                    Some(base) => base
                        .settings
                        .diff(&canonical.settings)
                        .into_iter()
                        .map(|(field, old, new)| ChangeNotification {
                            field,
                            old_value: Some(old),
                            new_value: new,
                            timestamp: now,
                            user: user.clone(),
                        })
                        .collect(),
                    None => patch
                        .iter()
                        .map(|(field, _)| ChangeNotification {
                            field: *field,
                            old_value: None,
                            new_value: canonical.settings.get(*field),
                            timestamp: now,
                            user: user.clone(),
                        })
                        .collect(),
                };
                for change in &changes {
                    self.bus.publish(change);
                }

                metrics::record_update("success");
                tracing::info!(
                    correlation_id = %correlation_id,
                    version = canonical.version(),
                    changed = changes.len(),
                    "Settings update confirmed"
                );
                Ok(UpdateOutcome {
                    snapshot: canonical,
                    changes,
                    correlation_id,
                })
            }
            Err(err) => {
                self.store.rollback_to(checkpoint);
                metrics::record_rollback();
                let error = settle_failure(
                    &self.breaker,
                    &self.rate_limit,
                    SettingsError::from_transport(err, expected_version),
                );
                if matches!(error, SettingsError::Conflict { .. }) {
                    self.store.invalidate();
                }
                metrics::record_update("failure");
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error = %error,
                    "Settings update rolled back"
                );
                Err(error)
            }
        }
    }
}

/// Write path of the settings cache.
#[derive(Clone)]
pub struct OptimisticUpdateManager {
    shared: Arc<UpdateShared>,
}

impl OptimisticUpdateManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<CacheStore>,
        breaker: Arc<CircuitBreaker>,
        rate_limit: Arc<RateLimitTracker>,
        transport: Arc<dyn SettingsTransport>,
        bus: Arc<NotificationBus>,
        clock: Arc<dyn Clock>,
        operator: Option<String>,
    ) -> Self {
        Self {
            shared: Arc::new(UpdateShared {
                store,
                breaker,
                rate_limit,
                transport,
                bus,
                clock,
                operator,
                write_lock: Arc::new(tokio::sync::Mutex::new(())),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Validate `patch`, publish it optimistically, and confirm it with the
    /// server. Calls queue behind any write already in progress.
    pub async fn update_settings(
        &self,
        patch: SettingsPatch,
        options: UpdateOptions,
    ) -> SettingsResult<UpdateOutcome> {
        if !options.skip_validation {
            let report = validate_patch(&patch);
            if !report.is_valid {
                metrics::record_update("invalid");
                tracing::debug!(errors = ?report.errors, "Settings update failed validation");
                return Err(SettingsError::Validation(report));
            }
        } else if patch.is_empty() {
            return Err(SettingsError::Validation(validate_patch(&patch)));
        }

        let guard = Arc::clone(&self.shared.write_lock).lock_owned().await;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.apply(patch, guard).await })
            .await
            .unwrap_or_else(|e| {
                Err(SettingsError::Network(format!(
                    "settings update task failed: {}",
                    e
                )))
            })
    }

    /// The write awaiting the server, if any.
    pub fn pending(&self) -> Option<PendingOptimisticUpdate> {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of writes awaiting the server (zero or one).
    pub fn pending_count(&self) -> usize {
        usize::from(self.pending().is_some())
    }
}
