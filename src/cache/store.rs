//! Holder of the live configuration snapshot.
//!
//! # Responsibilities
//! - Own the only live reference to the current snapshot
//! - Track freshness status alongside it
//! - Answer freshness lookups for the fetch path
//!
//! # Design Decisions
//! - Snapshot and status are swapped together as one immutable `CacheState`
//!   through `ArcSwap`, so a reader never pairs a new snapshot with an old
//!   status
//! - Every mutation is synchronous; nothing here awaits
//! - Writes bump a generation counter before they publish. A network read
//!   remembers the generation it started under and only lands if no write
//!   has published since and it is not older than the held snapshot
//! - `Fetching` is only entered from a fresh (or absent) snapshot, so an
//!   invalidated, stale or failed snapshot keeps its marker while a read
//!   is in flight

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::clock::Clock;
use crate::settings::ConfigurationSnapshot;

/// Freshness of the cached snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    /// Nothing usable; the next read goes to the network. A previously
    /// fetched snapshot may still be retained for display.
    Empty,
    /// Refresh in flight over a snapshot that was fresh when it started.
    Fetching,
    Fresh,
    Stale,
    /// Last fetch failed; any retained snapshot is served stale.
    Error,
}

/// Zero-or-one snapshot plus its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheState {
    pub snapshot: Option<Arc<ConfigurationSnapshot>>,
    pub status: CacheStatus,
}

impl CacheState {
    fn empty() -> Self {
        Self {
            snapshot: None,
            status: CacheStatus::Empty,
        }
    }

    fn with_status(&self, status: CacheStatus) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            status,
        }
    }
}

/// Result of a freshness lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Within TTL; serve without touching the network.
    Fresh(Arc<ConfigurationSnapshot>),
    /// Usable but due for revalidation.
    Stale(Arc<ConfigurationSnapshot>),
    /// Nothing servable; fetch.
    Miss,
}

/// The single owner of the live settings snapshot.
#[derive(Debug)]
pub struct CacheStore {
    state: ArcSwap<CacheState>,
    writes: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: ArcSwap::from_pointee(CacheState::empty()),
            writes: AtomicU64::new(0),
            clock,
        }
    }

    /// The whole state, for checkpoints and status reports.
    pub fn state(&self) -> Arc<CacheState> {
        self.state.load_full()
    }

    /// Current snapshot, if any.
    pub fn current(&self) -> Option<Arc<ConfigurationSnapshot>> {
        self.state.load().snapshot.clone()
    }

    pub fn status(&self) -> CacheStatus {
        self.state.load().status
    }

    fn expired(&self, snapshot: &ConfigurationSnapshot, ttl: Duration) -> bool {
        let age = self.clock.now_millis().saturating_sub(snapshot.fetched_at);
        age >= ttl.as_millis() as u64
    }

    /// Whether the cached value is missing, marked stale, or older than `ttl`.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        let state = self.state.load();
        match &state.snapshot {
            None => true,
            Some(snapshot) => !Self::holds_fresh(state.status) || self.expired(snapshot, ttl),
        }
    }

    fn holds_fresh(status: CacheStatus) -> bool {
        matches!(status, CacheStatus::Fresh | CacheStatus::Fetching)
    }

    /// Classify the cached value for a read.
    pub fn lookup(&self, ttl: Duration) -> Lookup {
        let state = self.state.load();
        match (&state.snapshot, state.status) {
            (None, _) | (_, CacheStatus::Empty) => Lookup::Miss,
            (Some(snapshot), status)
                if Self::holds_fresh(status) && !self.expired(snapshot, ttl) =>
            {
                Lookup::Fresh(Arc::clone(snapshot))
            }
            (Some(snapshot), _) => Lookup::Stale(Arc::clone(snapshot)),
        }
    }

    /// Atomically replace the snapshot and mark it fresh.
    pub fn publish(&self, snapshot: Arc<ConfigurationSnapshot>) {
        self.state.store(Arc::new(CacheState {
            snapshot: Some(snapshot),
            status: CacheStatus::Fresh,
        }));
    }

    /// Generation of the last write-path publish.
    pub fn write_generation(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Publish a snapshot produced by the write path.
    pub fn publish_write(&self, snapshot: Arc<ConfigurationSnapshot>) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.publish(snapshot);
    }

    /// Publish a snapshot read from the network under `generation`.
    ///
    /// The read is dropped when a write has published since it started or
    /// when the held snapshot carries a higher version; the held state is
    /// kept and an in-flight marker is cleared. Returns the snapshot that is
    /// live afterwards.
    pub fn publish_fetched(
        &self,
        snapshot: Arc<ConfigurationSnapshot>,
        generation: u64,
    ) -> Arc<ConfigurationSnapshot> {
        let mut live = Arc::clone(&snapshot);
        self.state.rcu(|state| match &state.snapshot {
            Some(held)
                if self.write_generation() != generation
                    || held.version() > snapshot.version() =>
            {
                live = Arc::clone(held);
                match state.status {
                    CacheStatus::Fetching => state.with_status(CacheStatus::Fresh),
                    _ => CacheState::clone(state),
                }
            }
            _ => {
                live = Arc::clone(&snapshot);
                CacheState {
                    snapshot: Some(Arc::clone(&snapshot)),
                    status: CacheStatus::Fresh,
                }
            }
        });
        if !Arc::ptr_eq(&live, &snapshot) {
            tracing::debug!(
                fetched = snapshot.version(),
                held = live.version(),
                "Discarded settings read superseded by a write"
            );
        }
        live
    }

    /// Note a network read in flight. Invalidated, stale and failed
    /// snapshots keep their status.
    pub fn mark_fetching(&self) {
        self.state.rcu(|state| match (&state.snapshot, state.status) {
            (Some(_), CacheStatus::Empty | CacheStatus::Stale | CacheStatus::Error) => {
                CacheState::clone(state)
            }
            _ => state.with_status(CacheStatus::Fetching),
        });
    }

    pub fn mark_error(&self) {
        self.state.rcu(|state| state.with_status(CacheStatus::Error));
    }

    /// Force revalidation on the next read while still serving the value.
    pub fn mark_stale(&self) {
        self.state.rcu(|state| match state.snapshot {
            Some(_) => state.with_status(CacheStatus::Stale),
            None => CacheState::clone(state),
        });
    }

    /// Restore a checkpoint taken with [`CacheStore::state`].
    pub fn rollback_to(&self, checkpoint: Arc<CacheState>) {
        self.state.store(checkpoint);
    }

    /// Drop freshness so the next read fetches; the snapshot stays
    /// available for display.
    pub fn invalidate(&self) {
        self.state.rcu(|state| state.with_status(CacheStatus::Empty));
        tracing::debug!("Settings cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::settings::types::sample_settings;

    const TTL: Duration = Duration::from_secs(300);

    fn store() -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        (CacheStore::new(clock.clone()), clock)
    }

    fn snapshot(at: u64) -> Arc<ConfigurationSnapshot> {
        Arc::new(ConfigurationSnapshot::new(sample_settings(), at))
    }

    #[test]
    fn test_starts_empty() {
        let (store, _clock) = store();
        assert!(store.current().is_none());
        assert_eq!(store.status(), CacheStatus::Empty);
        assert!(store.is_stale(TTL));
        assert_eq!(store.lookup(TTL), Lookup::Miss);
    }

    #[test]
    fn test_publish_and_expire() {
        let (store, clock) = store();
        let snap = snapshot(10_000);
        store.publish(snap.clone());

        assert!(!store.is_stale(TTL));
        assert_eq!(store.lookup(TTL), Lookup::Fresh(snap.clone()));
        assert!(Arc::ptr_eq(&store.current().unwrap(), &snap));

        clock.advance(TTL);
        assert!(store.is_stale(TTL));
        assert_eq!(store.lookup(TTL), Lookup::Stale(snap));
    }

    #[test]
    fn test_mark_stale_and_error_keep_snapshot() {
        let (store, _clock) = store();
        let snap = snapshot(10_000);
        store.publish(snap.clone());

        store.mark_stale();
        assert_eq!(store.status(), CacheStatus::Stale);
        assert_eq!(store.lookup(TTL), Lookup::Stale(snap.clone()));

        store.mark_error();
        assert_eq!(store.status(), CacheStatus::Error);
        assert_eq!(store.current(), Some(snap));
    }

    #[test]
    fn test_mark_stale_without_snapshot_is_noop() {
        let (store, _clock) = store();
        store.mark_stale();
        assert_eq!(store.status(), CacheStatus::Empty);
    }

    #[test]
    fn test_invalidate_retains_snapshot() {
        let (store, _clock) = store();
        let snap = snapshot(10_000);
        store.publish(snap.clone());

        store.invalidate();
        assert_eq!(store.status(), CacheStatus::Empty);
        assert_eq!(store.current(), Some(snap));
        assert_eq!(store.lookup(TTL), Lookup::Miss);
    }

    fn versioned(version: u64, cost_per_bag: &str) -> Arc<ConfigurationSnapshot> {
        let mut settings = sample_settings();
        settings.version = version;
        settings.cost_per_bag = cost_per_bag.into();
        Arc::new(ConfigurationSnapshot::new(settings, 10_000))
    }

    #[test]
    fn test_fetched_snapshot_publishes_when_no_write_intervened() {
        let (store, _clock) = store();
        store.publish(versioned(7, "15.00"));

        store.mark_fetching();
        let generation = store.write_generation();
        let fetched = versioned(8, "18.00");
        let live = store.publish_fetched(fetched.clone(), generation);

        assert!(Arc::ptr_eq(&live, &fetched));
        assert_eq!(store.state().status, CacheStatus::Fresh);
        assert_eq!(store.current(), Some(fetched));
    }

    #[test]
    fn test_read_started_before_write_is_discarded() {
        let (store, _clock) = store();
        store.publish(versioned(7, "15.00"));

        store.mark_fetching();
        let generation = store.write_generation();
        let confirmed = versioned(8, "16.00");
        store.publish_write(confirmed.clone());

        let live = store.publish_fetched(versioned(7, "15.00"), generation);
        assert!(Arc::ptr_eq(&live, &confirmed));
        assert_eq!(store.current().unwrap().version(), 8);
        assert_eq!(store.status(), CacheStatus::Fresh);
    }

    #[test]
    fn test_older_version_never_replaces_newer() {
        let (store, _clock) = store();
        store.publish(versioned(9, "17.00"));

        let generation = store.write_generation();
        store.mark_fetching();
        let live = store.publish_fetched(versioned(8, "16.00"), generation);

        assert_eq!(live.version(), 9);
        assert_eq!(store.current().unwrap().settings.cost_per_bag, "17.00");
        assert_eq!(store.status(), CacheStatus::Fresh);
    }

    #[test]
    fn test_fetched_snapshot_fills_empty_store_even_after_write() {
        let (store, _clock) = store();
        let generation = store.write_generation();
        store.publish_write(versioned(8, "16.00"));
        store.rollback_to(Arc::new(CacheState::empty()));

        let fetched = versioned(7, "15.00");
        let live = store.publish_fetched(fetched.clone(), generation);
        assert!(Arc::ptr_eq(&live, &fetched));
        assert_eq!(store.status(), CacheStatus::Fresh);
    }

    #[test]
    fn test_invalidated_marker_survives_fetch_start() {
        let (store, _clock) = store();
        store.publish(snapshot(10_000));
        store.invalidate();

        store.mark_fetching();
        assert_eq!(store.status(), CacheStatus::Empty);
        assert_eq!(store.lookup(TTL), Lookup::Miss);

        store.mark_error();
        store.mark_fetching();
        assert_eq!(store.status(), CacheStatus::Error);
    }

    #[test]
    fn test_refresh_of_fresh_snapshot_stays_valid_within_ttl() {
        let (store, clock) = store();
        let snap = snapshot(10_000);
        store.publish(snap.clone());

        store.mark_fetching();
        assert_eq!(store.status(), CacheStatus::Fetching);
        assert!(!store.is_stale(TTL));
        assert_eq!(store.lookup(TTL), Lookup::Fresh(snap.clone()));

        clock.advance(TTL);
        assert!(store.is_stale(TTL));
        assert_eq!(store.lookup(TTL), Lookup::Stale(snap));
    }

    #[test]
    fn test_first_fetch_marks_fetching() {
        let (store, _clock) = store();
        store.mark_fetching();
        assert_eq!(store.status(), CacheStatus::Fetching);
        assert_eq!(store.lookup(TTL), Lookup::Miss);
    }

    #[test]
    fn test_rollback_restores_checkpoint() {
        let (store, _clock) = store();
        store.publish(snapshot(10_000));
        let checkpoint = store.state();

        let mut changed = sample_settings();
        changed.cost_per_bag = "99.00".into();
        store.publish(Arc::new(ConfigurationSnapshot::new(changed, 10_000)));
        assert_ne!(*store.state(), *checkpoint);

        store.rollback_to(checkpoint.clone());
        assert_eq!(*store.state(), *checkpoint);
    }
}
