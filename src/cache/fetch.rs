//! Single-flight read-through loader.
//!
//! # Responsibilities
//! - Gate reads on the circuit breaker and rate-limit tracker
//! - Serve fresh snapshots from the store; serve stale ones while revalidating
//! - Collapse concurrent network reads into one
//! - Publish fetched snapshots and report outcomes to the resilience gates
//!
//! # Design Decisions
//! - The network read runs in a spawned task; callers share its `JoinHandle`
//!   through `Shared`, so dropping a caller never cancels the fetch
//! - The in-flight slot is cleared by a drop guard after publishing, so a
//!   failed or panicked fetch never leaves the slot occupied
//! - A read overtaken by a write resolves to the write's snapshot instead of
//!   its own response

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use crate::cache::store::{CacheStore, Lookup};
use crate::clock::Clock;
use crate::error::{SettingsError, SettingsResult};
use crate::observability::metrics;
use crate::resilience::{settle_failure, CircuitBreaker, RateLimitTracker};
use crate::settings::ConfigurationSnapshot;
use crate::transport::SettingsTransport;

type SharedFetch = Shared<BoxFuture<'static, SettingsResult<Arc<ConfigurationSnapshot>>>>;

/// Read options.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Skip the cache and read from the network.
    pub force_refresh: bool,
}

impl FetchOptions {
    pub fn forced() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// How a read was served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchMetadata {
    /// Served from the store without waiting on the network.
    pub cached: bool,
    /// Served past its TTL while a revalidation runs.
    pub stale: bool,
    pub duration: Duration,
}

/// Successful read.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub snapshot: Arc<ConfigurationSnapshot>,
    pub metadata: FetchMetadata,
}

struct FetchShared {
    store: Arc<CacheStore>,
    breaker: Arc<CircuitBreaker>,
    rate_limit: Arc<RateLimitTracker>,
    transport: Arc<dyn SettingsTransport>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    in_flight: Mutex<Option<SharedFetch>>,
}

/// Clears the in-flight slot when the fetch task finishes, however it ends.
struct ClearInFlight<'a>(&'a Mutex<Option<SharedFetch>>);

impl Drop for ClearInFlight<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl FetchShared {
    fn slot(&self) -> MutexGuard<'_, Option<SharedFetch>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_once(&self) -> SettingsResult<Arc<ConfigurationSnapshot>> {
        let _clear = ClearInFlight(&self.in_flight);
        self.store.mark_fetching();
        let generation = self.store.write_generation();
        tracing::debug!(generation, "Fetching settings");

        match self.transport.fetch_settings().await {
            Ok(settings) => {
                let fetched = Arc::new(ConfigurationSnapshot::new(
                    settings,
                    self.clock.now_millis(),
                ));
                let snapshot = self.store.publish_fetched(fetched, generation);
                self.breaker.record_success();
                self.rate_limit.record_response();
                metrics::record_fetch("success");
                tracing::info!(version = snapshot.version(), "Settings fetched");
                Ok(snapshot)
            }
            Err(err) => {
                let error = settle_failure(
                    &self.breaker,
                    &self.rate_limit,
                    SettingsError::from_transport(err, None),
                );
                self.store.mark_error();
                metrics::record_fetch("failure");
                tracing::warn!(
                    error = %error,
                    serving_stale = self.store.current().is_some(),
                    "Settings fetch failed"
                );
                Err(error)
            }
        }
    }
}

/// Read path of the settings cache.
#[derive(Clone)]
pub struct FetchOrchestrator {
    shared: Arc<FetchShared>,
}

impl FetchOrchestrator {
    pub fn new(
        store: Arc<CacheStore>,
        breaker: Arc<CircuitBreaker>,
        rate_limit: Arc<RateLimitTracker>,
        transport: Arc<dyn SettingsTransport>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(FetchShared {
                store,
                breaker,
                rate_limit,
                transport,
                clock,
                ttl,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Read the settings.
    ///
    /// Fails fast with [`SettingsError::CircuitOpen`] or
    /// [`SettingsError::RateLimited`] without touching the network. A fresh
    /// snapshot is returned as-is; a stale one is returned immediately while a
    /// background revalidation starts. Otherwise the caller waits on the
    /// (possibly shared) network read.
    pub async fn get_settings(&self, options: FetchOptions) -> SettingsResult<FetchResult> {
        let started = Instant::now();
        self.shared.breaker.check()?;
        self.shared.rate_limit.check()?;

        if !options.force_refresh {
            match self.shared.store.lookup(self.shared.ttl) {
                Lookup::Fresh(snapshot) => {
                    metrics::record_cache_hit();
                    return Ok(FetchResult {
                        snapshot,
                        metadata: FetchMetadata {
                            cached: true,
                            stale: false,
                            duration: started.elapsed(),
                        },
                    });
                }
                Lookup::Stale(snapshot) => {
                    metrics::record_stale_served();
                    if let Err(e) = self.start_or_join() {
                        tracing::debug!(error = %e, "Background revalidation not started");
                    }
                    return Ok(FetchResult {
                        snapshot,
                        metadata: FetchMetadata {
                            cached: true,
                            stale: true,
                            duration: started.elapsed(),
                        },
                    });
                }
                Lookup::Miss => {}
            }
        }

        let fetched = self.start_or_join()?.await?;
        // A joined read may have resolved just before a write published.
        let snapshot = match self.shared.store.current() {
            Some(live) if live.version() > fetched.version() => live,
            _ => fetched,
        };
        Ok(FetchResult {
            snapshot,
            metadata: FetchMetadata {
                cached: false,
                stale: false,
                duration: started.elapsed(),
            },
        })
    }

    /// Whether a network read is currently in flight.
    pub fn is_fetching(&self) -> bool {
        self.shared.slot().is_some()
    }

    fn start_or_join(&self) -> SettingsResult<SharedFetch> {
        let mut slot = self.shared.slot();
        if let Some(fetch) = slot.as_ref() {
            tracing::trace!("Joining in-flight settings fetch");
            return Ok(fetch.clone());
        }

        self.shared.breaker.try_acquire()?;

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move { shared.fetch_once().await });
        let fetch = async move {
            handle.await.unwrap_or_else(|e| {
                Err(SettingsError::Network(format!(
                    "settings fetch task failed: {}",
                    e
                )))
            })
        }
        .boxed()
        .shared();

        *slot = Some(fetch.clone());
        Ok(fetch)
    }
}
