//! Session-wide settings service.
//!
//! # Responsibilities
//! - Own exactly one instance of every cache component for the session
//! - Expose the consumer surface used by UI bindings
//! - Turn typed errors into user feedback for the bool-returning calls
//!
//! # Design Decisions
//! - An explicit value constructed once per session, not a global
//! - Components are shared through `Arc`; the service itself is cheap to clone
//! - Result-returning variants exist alongside the bool-returning ones

pub mod feedback;

pub use feedback::{Feedback, LogFeedback};

use std::sync::Arc;

use serde::Serialize;

use crate::cache::{
    CacheStatus, CacheStore, FetchOptions, FetchOrchestrator, FetchResult,
    OptimisticUpdateManager, UpdateOptions, UpdateOutcome,
};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::{SettingsError, SettingsResult};
use crate::notifications::{ChangeNotification, NotificationBus, Subscription};
use crate::resilience::{CircuitBreaker, CircuitBreakerState, RateLimitTracker};
use crate::settings::{
    validate_patch, ConfigurationSnapshot, SettingValue, SettingsField, SettingsPatch,
    ValidationReport,
};
use crate::transport::SettingsTransport;

/// Point-in-time view of the cache and its gates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatusReport {
    /// A snapshot is held (fresh or not).
    pub is_cached: bool,
    /// The held snapshot is fresh and within TTL.
    pub is_valid: bool,
    /// Epoch milliseconds of the last fetch.
    pub last_fetched: Option<u64>,
    pub version: Option<u64>,
    pub optimistic_updates: usize,
    pub is_rate_limited: bool,
    pub rate_limited_until: Option<u64>,
    pub consecutive_rate_limits: u32,
    pub status: CacheStatus,
    pub circuit: CircuitBreakerState,
}

/// The settings cache for one application session.
#[derive(Clone)]
pub struct SettingsService {
    config: ClientConfig,
    store: Arc<CacheStore>,
    breaker: Arc<CircuitBreaker>,
    rate_limit: Arc<RateLimitTracker>,
    bus: Arc<NotificationBus>,
    fetcher: FetchOrchestrator,
    updater: OptimisticUpdateManager,
    feedback: Arc<dyn Feedback>,
}

impl SettingsService {
    /// Build a service on the system clock with log-only feedback.
    pub fn new(config: &ClientConfig, transport: Arc<dyn SettingsTransport>) -> Self {
        Self::with_parts(
            config,
            transport,
            Arc::new(SystemClock),
            Arc::new(LogFeedback),
        )
    }

    pub fn with_parts(
        config: &ClientConfig,
        transport: Arc<dyn SettingsTransport>,
        clock: Arc<dyn Clock>,
        feedback: Arc<dyn Feedback>,
    ) -> Self {
        let store = Arc::new(CacheStore::new(Arc::clone(&clock)));
        let breaker = Arc::new(CircuitBreaker::new(
            &config.circuit_breaker,
            Arc::clone(&clock),
        ));
        let rate_limit = Arc::new(RateLimitTracker::new(&config.rate_limit, Arc::clone(&clock)));
        let bus = Arc::new(NotificationBus::new());

        let fetcher = FetchOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&breaker),
            Arc::clone(&rate_limit),
            Arc::clone(&transport),
            Arc::clone(&clock),
            config.cache.ttl(),
        );
        let updater = OptimisticUpdateManager::new(
            Arc::clone(&store),
            Arc::clone(&breaker),
            Arc::clone(&rate_limit),
            transport,
            Arc::clone(&bus),
            clock,
            config.api.operator.clone(),
        );

        tracing::debug!(
            ttl_secs = config.cache.ttl_secs,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "Settings service created"
        );

        Self {
            config: config.clone(),
            store,
            breaker,
            rate_limit,
            bus,
            fetcher,
            updater,
            feedback,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current snapshot without touching the network.
    pub fn current(&self) -> Option<Arc<ConfigurationSnapshot>> {
        self.store.current()
    }

    /// Typed read.
    pub async fn fetch_settings(&self, options: FetchOptions) -> SettingsResult<FetchResult> {
        self.fetcher.get_settings(options).await
    }

    /// Load settings into the cache. Failures are reported to the feedback
    /// sink; any previously cached snapshot stays available.
    pub async fn load_settings(&self, force_refresh: bool) -> bool {
        match self
            .fetch_settings(FetchOptions { force_refresh })
            .await
        {
            Ok(_) => true,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Typed write.
    pub async fn submit_update(
        &self,
        patch: SettingsPatch,
        options: UpdateOptions,
    ) -> SettingsResult<UpdateOutcome> {
        self.updater.update_settings(patch, options).await
    }

    /// Validate and write `patch`.
    pub async fn update_settings(&self, patch: SettingsPatch) -> bool {
        match self.submit_update(patch, UpdateOptions::default()).await {
            Ok(_) => {
                self.feedback.info("Settings updated successfully");
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Write a single field.
    pub async fn update_setting(
        &self,
        field: SettingsField,
        value: impl Into<SettingValue>,
    ) -> bool {
        self.update_settings(SettingsPatch::new().with(field, value))
            .await
    }

    /// Run the validation gate without writing.
    pub fn validate_settings(&self, patch: &SettingsPatch) -> ValidationReport {
        validate_patch(patch)
    }

    /// Subscribe to confirmed per-field changes.
    pub fn on_settings_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeNotification) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    pub fn get_cache_status(&self) -> CacheStatusReport {
        let state = self.store.state();
        let limit = self.rate_limit.state();
        let snapshot = state.snapshot.as_deref();
        CacheStatusReport {
            is_cached: snapshot.is_some(),
            is_valid: !self.store.is_stale(self.config.cache.ttl()),
            last_fetched: snapshot.map(|s| s.fetched_at),
            version: snapshot.map(ConfigurationSnapshot::version),
            optimistic_updates: self.updater.pending_count(),
            is_rate_limited: limit.is_rate_limited,
            rate_limited_until: limit.rate_limited_until,
            consecutive_rate_limits: limit.consecutive_rate_limits,
            status: state.status,
            circuit: self.breaker.state(),
        }
    }

    /// Force the next read to go to the network.
    pub fn invalidate_cache(&self) {
        self.store.invalidate();
    }

    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
        self.feedback.info("Settings service connection reset");
    }

    fn report(&self, error: &SettingsError) {
        let message = match error.validation_report() {
            Some(report) if !report.errors.is_empty() => {
                format!("{}: {}", error, report.errors.join("; "))
            }
            _ => error.to_string(),
        };
        self.feedback.error(&message, error.is_retryable());
    }
}

impl std::fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsService")
            .field("status", &self.store.status())
            .field("circuit", &self.breaker.state().state)
            .field("subscribers", &self.bus.subscriber_count())
            .finish()
    }
}
