//! Owner of the current reading, the accepted-value log and the settings.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use matoswim_types::{ChangeResult, Reading, ReadingSource, TrackerSnapshot};

use crate::notify::{DEFAULT_COOLDOWN, DEFAULT_DEBOUNCE, Due, Evaluation, NotificationScheduler};
use crate::preferences::{DEFAULT_THRESHOLD, Preferences};
use crate::seed::SeedData;

/// Default number of accepted readings kept in memory.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Tracker shared between the poll scheduler, the dispatcher and the API.
pub type SharedTracker = Arc<Mutex<ReadingTracker>>;

/// Tuning for a [`ReadingTracker`].
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Maximum log length; the oldest entries are dropped first.
    pub log_capacity: usize,
    /// Delay before a qualifying reading raises an alert.
    pub debounce: Duration,
    /// Minimum gap between delivered alerts.
    pub cooldown: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            debounce: DEFAULT_DEBOUNCE,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Holds the latest reading and decides whether a candidate is new.
///
/// All mutation happens through `&mut self`, so the dedupe check, the
/// replacement, the log append and the persistence write form one critical
/// section under the owning lock.
#[derive(Debug)]
pub struct ReadingTracker {
    preferences: Preferences,
    current: Option<Reading>,
    log: VecDeque<Reading>,
    log_capacity: usize,
    threshold: f64,
    notifications_enabled: bool,
    notifications: NotificationScheduler,
}

impl ReadingTracker {
    /// Restore state at activation.
    ///
    /// The current reading comes from the persisted value, else the seed
    /// entry for today's date, else stays absent. Bootstrapping never touches
    /// the log and never schedules an alert. Unreadable settings fall back to
    /// their defaults.
    pub fn activate(
        preferences: Preferences,
        seed: Option<&SeedData>,
        now: OffsetDateTime,
        options: TrackerOptions,
    ) -> Self {
        let threshold = preferences.threshold().unwrap_or_else(|e| {
            warn!("Using default threshold: {}", e);
            DEFAULT_THRESHOLD
        });
        let notifications_enabled = preferences.notifications_enabled().unwrap_or_else(|e| {
            warn!("Notifications disabled: {}", e);
            false
        });

        let persisted = preferences
            .last_reading(now.date(), now.offset(), now)
            .unwrap_or_else(|e| {
                warn!("Ignoring persisted reading: {}", e);
                None
            });

        let current = persisted.or_else(|| {
            seed.and_then(|s| s.value_for(now.date()))
                .map(|value| Reading::new(value, now).with_source(ReadingSource::Seed))
        });

        match &current {
            Some(reading) => info!("Restored {} reading {}", reading.source, reading),
            None => info!("No reading available at activation"),
        }

        Self {
            preferences,
            current,
            log: VecDeque::new(),
            log_capacity: options.log_capacity.max(1),
            threshold,
            notifications_enabled,
            notifications: NotificationScheduler::new(options.debounce, options.cooldown),
        }
    }

    /// Wrap the tracker for sharing.
    pub fn into_shared(self) -> SharedTracker {
        Arc::new(Mutex::new(self))
    }

    /// Offer a candidate reading.
    ///
    /// A candidate whose one-decimal value equals the current one is
    /// discarded without any mutation. Otherwise it becomes current, is
    /// appended to the log, is persisted, and is handed to the notification
    /// scheduler.
    pub fn submit(&mut self, candidate: Reading, now: Instant) -> ChangeResult {
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.same_value(&candidate))
        {
            debug!("Reading {} unchanged", candidate.formatted_value());
            return ChangeResult::Unchanged;
        }

        self.current = Some(candidate.clone());
        if self.log.len() >= self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(candidate.clone());

        if let Err(e) = self.preferences.save_reading(&candidate) {
            warn!("Failed to persist reading {}: {}", candidate, e);
        }

        info!("Water temperature updated: {}", candidate);

        match self.notifications.evaluate(
            &candidate,
            self.threshold,
            self.notifications_enabled,
            now,
        ) {
            Evaluation::Scheduled { superseded, .. } => {
                debug!("Threshold reached (superseded pending: {})", superseded)
            }
            Evaluation::BelowThreshold { cancelled: true }
            | Evaluation::Disabled { cancelled: true } => {
                debug!("Pending alert withdrawn")
            }
            _ => {}
        }

        ChangeResult::Changed(candidate)
    }

    /// The current reading, if any.
    pub fn current(&self) -> Option<&Reading> {
        self.current.as_ref()
    }

    /// Accepted readings in arrival order.
    pub fn log(&self) -> impl ExactSizeIterator<Item = &Reading> {
        self.log.iter()
    }

    /// Number of entries in the log.
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Alert threshold in degrees Celsius.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether alerts are enabled.
    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    /// Change and persist the threshold.
    ///
    /// A pending alert is re-checked against the new threshold when it fires.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
        if let Err(e) = self.preferences.save_threshold(threshold) {
            warn!("Failed to persist threshold: {}", e);
        }
        info!("Threshold set to {:.1}°C", threshold);
    }

    /// Enable or disable alerts and persist the flag.
    ///
    /// Disabling cancels any pending alert.
    pub fn set_notifications_enabled(&mut self, enabled: bool) {
        self.notifications_enabled = enabled;
        if !enabled {
            self.notifications.cancel();
        }
        if let Err(e) = self.preferences.save_notifications_enabled(enabled) {
            warn!("Failed to persist notifications flag: {}", e);
        }
        info!(
            "Notifications {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Display-ready view of the state.
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot::new(
            self.current.as_ref(),
            self.threshold,
            self.notifications_enabled,
            self.log.len(),
        )
    }

    /// The notification scheduler.
    pub fn notifications(&self) -> &NotificationScheduler {
        &self.notifications
    }

    /// Deadline of the pending alert, if any.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.notifications.pending_deadline()
    }

    /// Handle signalled whenever the pending deadline changes.
    pub fn timer(&self) -> Arc<Notify> {
        self.notifications.timer()
    }

    /// Re-check the pending alert against the current settings.
    pub fn take_due_alert(&mut self, now: Instant) -> Due {
        self.notifications
            .take_due(now, self.threshold, self.notifications_enabled)
    }

    /// Start the cooldown after a successful delivery.
    pub fn record_notification_delivery(&mut self, now: Instant) {
        self.notifications.record_delivery(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use crate::preferences::{KeyValueStore, MemoryStore, keys};
    use matoswim_types::NOT_AVAILABLE;
    use proptest::prelude::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-07-26 10:00:00 UTC);

    fn tracker_with(store: MemoryStore, seed: Option<&SeedData>) -> ReadingTracker {
        ReadingTracker::activate(
            Preferences::new(store),
            seed,
            NOW,
            TrackerOptions::default(),
        )
    }

    fn reading(value: f64, seconds: i64) -> Reading {
        Reading::new(value, NOW + time::Duration::seconds(seconds))
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, PersistenceError> {
            Err(PersistenceError::Unavailable("disk gone".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("disk gone".to_string()))
        }

        fn set_many(&self, _entries: &[(&str, &str)]) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("disk gone".to_string()))
        }
    }

    #[test]
    fn test_empty_bootstrap_is_not_available() {
        let tracker = tracker_with(MemoryStore::new(), Some(&SeedData::default()));
        assert!(tracker.current().is_none());
        assert_eq!(tracker.snapshot().display, NOT_AVAILABLE);
        assert_eq!(tracker.threshold(), DEFAULT_THRESHOLD);
        assert!(!tracker.notifications_enabled());
    }

    #[test]
    fn test_bootstrap_from_seed() {
        let seed = SeedData::from_entries([("07-26", 17.3)]);
        let tracker = tracker_with(MemoryStore::new(), Some(&seed));
        let current = tracker.current().unwrap();
        assert_eq!(current.value, 17.3);
        assert_eq!(current.source, ReadingSource::Seed);
        assert_eq!(tracker.log_len(), 0);
        assert!(tracker.pending_deadline().is_none());
    }

    #[test]
    fn test_persisted_reading_wins_over_seed() {
        let store = MemoryStore::new();
        store.set(keys::LAST_WATER_TEMPERATURE, "19.1").unwrap();
        store.set(keys::LAST_UPDATED_TIME, "08:30:00").unwrap();
        store.set(keys::NOTIFICATIONS_ENABLED, "true").unwrap();
        let seed = SeedData::from_entries([("07-26", 17.3)]);

        let tracker = tracker_with(store, Some(&seed));
        let current = tracker.current().unwrap();
        assert_eq!(current.value, 19.1);
        assert_eq!(current.source, ReadingSource::Persisted);
        assert_eq!(current.time_of_day(), "08:30:00");
        // Restored readings above the threshold do not raise alerts.
        assert!(tracker.pending_deadline().is_none());
    }

    #[test]
    fn test_corrupt_persisted_reading_falls_back_to_seed() {
        let store = MemoryStore::new();
        store.set(keys::LAST_WATER_TEMPERATURE, "n/a").unwrap();
        let seed = SeedData::from_entries([("07-26", 17.3)]);
        let tracker = tracker_with(store, Some(&seed));
        assert_eq!(tracker.current().unwrap().source, ReadingSource::Seed);
    }

    #[tokio::test]
    async fn test_first_reading_is_changed() {
        let store = MemoryStore::new();
        let mut tracker = tracker_with(store.clone(), None);
        let result = tracker.submit(reading(18.5, 0), Instant::now());
        assert!(result.is_changed());
        assert_eq!(tracker.log_len(), 1);
        assert_eq!(
            store.get(keys::LAST_WATER_TEMPERATURE).unwrap().as_deref(),
            Some("18.5")
        );
        assert_eq!(
            store.get(keys::LAST_UPDATED_TIME).unwrap().as_deref(),
            Some("10:00:00")
        );
    }

    #[tokio::test]
    async fn test_equal_reading_is_unchanged() {
        let mut tracker = tracker_with(MemoryStore::new(), None);
        tracker.submit(reading(18.5, 0), Instant::now());
        let result = tracker.submit(reading(18.54, 900), Instant::now());
        assert_eq!(result, ChangeResult::Unchanged);
        assert_eq!(tracker.current().unwrap().timestamp, NOW);
        assert_eq!(tracker.log_len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_reading_does_not_evaluate() {
        let store = MemoryStore::new();
        store.set(keys::LAST_WATER_TEMPERATURE, "19.0").unwrap();
        store.set(keys::NOTIFICATIONS_ENABLED, "true").unwrap();
        let mut tracker = tracker_with(store, None);

        assert_eq!(
            tracker.submit(reading(19.0, 0), Instant::now()),
            ChangeResult::Unchanged
        );
        assert!(tracker.pending_deadline().is_none());
    }

    #[tokio::test]
    async fn test_seeded_value_dedupes_first_live_reading() {
        let seed = SeedData::from_entries([("07-26", 17.3)]);
        let mut tracker = tracker_with(MemoryStore::new(), Some(&seed));
        assert_eq!(
            tracker.submit(reading(17.3, 0), Instant::now()),
            ChangeResult::Unchanged
        );
        assert_eq!(tracker.current().unwrap().source, ReadingSource::Seed);
    }

    #[tokio::test]
    async fn test_qualifying_reading_schedules_alert() {
        let store = MemoryStore::new();
        store.set(keys::NOTIFICATIONS_ENABLED, "true").unwrap();
        let mut tracker = tracker_with(store, None);
        let now = Instant::now();

        tracker.submit(reading(18.0, 0), now);
        assert_eq!(tracker.pending_deadline(), Some(now + DEFAULT_DEBOUNCE));
    }

    #[tokio::test]
    async fn test_disabling_cancels_pending_alert() {
        let store = MemoryStore::new();
        store.set(keys::NOTIFICATIONS_ENABLED, "true").unwrap();
        let mut tracker = tracker_with(store.clone(), None);

        tracker.submit(reading(19.0, 0), Instant::now());
        assert!(tracker.pending_deadline().is_some());

        tracker.set_notifications_enabled(false);
        assert!(tracker.pending_deadline().is_none());
        assert_eq!(
            store.get(keys::NOTIFICATIONS_ENABLED).unwrap().as_deref(),
            Some("false")
        );
    }

    #[tokio::test]
    async fn test_raised_threshold_suppresses_at_recheck() {
        let store = MemoryStore::new();
        store.set(keys::NOTIFICATIONS_ENABLED, "true").unwrap();
        let mut tracker = tracker_with(store.clone(), None);
        let now = Instant::now();

        tracker.submit(reading(19.0, 0), now);
        tracker.set_threshold(20.0);
        assert_eq!(
            store.get(keys::TEMPERATURE_THRESHOLD).unwrap().as_deref(),
            Some("20.0")
        );
        assert!(matches!(
            tracker.take_due_alert(now + DEFAULT_DEBOUNCE),
            Due::Suppressed(_)
        ));
    }

    #[tokio::test]
    async fn test_log_is_bounded() {
        let mut tracker = ReadingTracker::activate(
            Preferences::new(MemoryStore::new()),
            None,
            NOW,
            TrackerOptions {
                log_capacity: 3,
                ..Default::default()
            },
        );
        for (i, value) in [15.0, 16.0, 17.0, 18.0, 19.0].into_iter().enumerate() {
            tracker.submit(reading(value, i as i64), Instant::now());
        }
        let values: Vec<f64> = tracker.log().map(|r| r.value).collect();
        assert_eq!(values, vec![17.0, 18.0, 19.0]);
    }

    #[tokio::test]
    async fn test_persistence_failure_still_updates_memory() {
        let mut tracker = ReadingTracker::activate(
            Preferences::new(FailingStore),
            None,
            NOW,
            TrackerOptions::default(),
        );
        assert!(tracker.current().is_none());
        assert!(tracker.submit(reading(18.5, 0), Instant::now()).is_changed());
        assert_eq!(tracker.current().unwrap().value, 18.5);
        tracker.set_threshold(19.0);
        assert_eq!(tracker.threshold(), 19.0);
    }

    proptest! {
        #[test]
        fn log_has_no_consecutive_duplicates(
            tenths in proptest::collection::vec(150i32..200, 0..60)
        ) {
            let mut tracker = tracker_with(MemoryStore::new(), None);
            let now = Instant::now();
            for (i, t) in tenths.iter().enumerate() {
                tracker.submit(reading(f64::from(*t) / 10.0, i as i64), now);
            }
            let log: Vec<String> = tracker.log().map(Reading::formatted_value).collect();
            for pair in log.windows(2) {
                prop_assert_ne!(&pair[0], &pair[1]);
            }
        }

        #[test]
        fn below_threshold_never_schedules(value in -5.0f64..17.95) {
            let store = MemoryStore::new();
            store.set(keys::NOTIFICATIONS_ENABLED, "true").unwrap();
            let mut tracker = tracker_with(store, None);
            tracker.submit(reading(value, 0), Instant::now());
            prop_assert!(tracker.pending_deadline().is_none());
        }
    }
}
