//! End-to-end tests of the polling pipeline with mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use matoswim_core::{
    CycleOutcome, KeyValueStore, MemoryStore, MockFetcher, Monitor, MonitorOptions, NOT_AVAILABLE,
    Preferences, ReadingSource, RecordingNotifier, SeedData, keys, page_with_temperature,
};

fn enabled_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.set(keys::NOTIFICATIONS_ENABLED, "true").unwrap();
    store.set(keys::TEMPERATURE_THRESHOLD, "18.0").unwrap();
    store
}

fn monitor(
    store: MemoryStore,
    seed: Option<&SeedData>,
    fetcher: &Arc<MockFetcher>,
    notifier: &Arc<RecordingNotifier>,
) -> Monitor {
    Monitor::new(
        Preferences::new(store),
        seed,
        fetcher.clone(),
        notifier.clone(),
        MonitorOptions::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_burst_within_debounce_alerts_once_with_latest_value() {
    let fetcher = Arc::new(MockFetcher::new());
    for value in [17.0, 19.0, 19.0, 20.0] {
        fetcher.push_page(page_with_temperature(value));
    }
    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = monitor(enabled_store(), None, &fetcher, &notifier);

    // The activation cycle consumes the first page.
    monitor.start().await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(fetcher.fetch_count(), 1);

    assert!(matches!(
        monitor.poller().refresh().await,
        CycleOutcome::Updated(_)
    ));
    assert_eq!(monitor.poller().refresh().await, CycleOutcome::Unchanged);
    assert!(matches!(
        monitor.poller().refresh().await,
        CycleOutcome::Updated(_)
    ));

    tokio::time::sleep(Duration::from_secs(11)).await;

    let alerts = notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].value, 20.0);
    assert_eq!(alerts[0].title, "Water Temperature Alert");
    assert_eq!(
        alerts[0].body,
        "The water temperature in Matosinhos is now 20.0°C!"
    );

    let tracker = monitor.tracker().lock().await;
    let log: Vec<f64> = tracker.log().map(|r| r.value).collect();
    assert_eq!(log, vec![17.0, 19.0, 20.0]);
    drop(tracker);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_alerts_respect_cooldown() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.push_page(page_with_temperature(19.0));
    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = monitor(enabled_store(), None, &fetcher, &notifier);

    monitor.start().await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(notifier.count(), 1);

    // Fires 20s after the first alert: inside the cooldown.
    tokio::time::sleep(Duration::from_secs(9)).await;
    fetcher.push_page(page_with_temperature(21.0));
    monitor.poller().refresh().await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(notifier.count(), 1);

    // Fires 80s after the first alert.
    tokio::time::sleep(Duration::from_secs(49)).await;
    fetcher.push_page(page_with_temperature(22.0));
    monitor.poller().refresh().await;
    tokio::time::sleep(Duration::from_secs(11)).await;

    let alerts = notifier.alerts();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[1].value, 22.0);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_is_not_counted_for_cooldown() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.push_page(page_with_temperature(19.0));
    let notifier = Arc::new(RecordingNotifier::new());
    notifier.set_failing(true);
    let monitor = monitor(enabled_store(), None, &fetcher, &notifier);

    monitor.start().await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(notifier.count(), 0);

    notifier.set_failing(false);
    fetcher.push_page(page_with_temperature(19.5));
    monitor.poller().refresh().await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(notifier.count(), 1);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_notifications_never_alert() {
    let fetcher = Arc::new(MockFetcher::with_temperature(21.0));
    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = monitor(MemoryStore::new(), None, &fetcher, &notifier);

    monitor.start().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(notifier.count(), 0);
    assert_eq!(
        monitor.tracker().lock().await.current().map(|r| r.value),
        Some(21.0)
    );
    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_three_failed_fetches_keep_reading() {
    let fetcher = Arc::new(MockFetcher::with_temperature(18.5));
    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = monitor(enabled_store(), None, &fetcher, &notifier);

    monitor.start().await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    let before = monitor.tracker().lock().await.current().cloned().unwrap();
    assert_eq!(notifier.count(), 1);

    fetcher.set_failing(true);
    for _ in 0..3 {
        assert!(matches!(
            monitor.poller().refresh().await,
            CycleOutcome::FetchFailed(_)
        ));
    }
    tokio::time::sleep(Duration::from_secs(120)).await;

    let tracker = monitor.tracker().lock().await;
    assert_eq!(tracker.current(), Some(&before));
    assert!(tracker.pending_deadline().is_none());
    drop(tracker);
    assert_eq!(notifier.count(), 1);
    assert_eq!(monitor.poller().stats().consecutive_failures, 3);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_empty_bootstrap_without_seed_entry() {
    let fetcher = Arc::new(MockFetcher::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let seed = SeedData::default();
    let monitor = monitor(MemoryStore::new(), Some(&seed), &fetcher, &notifier);

    let snapshot = monitor.tracker().lock().await.snapshot();
    assert_eq!(snapshot.display, NOT_AVAILABLE);
    assert!(snapshot.temperature.is_none());
}

#[tokio::test]
async fn test_reading_survives_restart() {
    let store = MemoryStore::new();
    let fetcher = Arc::new(MockFetcher::with_temperature(18.7));
    let notifier = Arc::new(RecordingNotifier::new());

    let first = monitor(store.clone(), None, &fetcher, &notifier);
    first.poller().refresh().await;
    let saved = first.tracker().lock().await.current().cloned().unwrap();

    let second = monitor(store, Some(&SeedData::bundled().unwrap()), &fetcher, &notifier);
    let tracker = second.tracker().lock().await;
    let restored = tracker.current().unwrap();
    assert_eq!(restored.value, 18.7);
    assert_eq!(restored.timestamp, saved.timestamp);
    assert_eq!(restored.source, ReadingSource::Persisted);
    assert_eq!(tracker.log_len(), 0);
}
