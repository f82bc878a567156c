//! Wiring of the whole pipeline.
//!
//! A [`Monitor`] owns the tracker and the poll scheduler and runs the poll
//! loop and the notification dispatcher as background tasks.

use std::sync::{Arc, Mutex, PoisonError};

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::fetch::Fetcher;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::poll::{PollOptions, PollScheduler, local_now};
use crate::preferences::Preferences;
use crate::seed::SeedData;
use crate::tracker::{ReadingTracker, SharedTracker, TrackerOptions};

/// Options for a [`Monitor`].
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    pub tracker: TrackerOptions,
    pub poll: PollOptions,
}

/// The running monitor.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use matoswim_core::{LogNotifier, MemoryStore, MockFetcher, Monitor, Preferences};
///
/// #[tokio::main]
/// async fn main() {
///     let monitor = Monitor::new(
///         Preferences::new(MemoryStore::new()),
///         None,
///         Arc::new(MockFetcher::with_temperature(18.5)),
///         Arc::new(LogNotifier),
///         Default::default(),
///     );
///     monitor.poller().refresh().await;
///     let snapshot = monitor.tracker().lock().await.snapshot();
///     assert_eq!(snapshot.display, "18.5°C");
/// }
/// ```
pub struct Monitor {
    tracker: SharedTracker,
    poller: Arc<PollScheduler>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Restore state and build the pipeline. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        preferences: Preferences,
        seed: Option<&SeedData>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        options: MonitorOptions,
    ) -> Self {
        Self::activate_at(preferences, seed, fetcher, notifier, options, local_now())
    }

    /// Like [`new`](Self::new) with an explicit activation time.
    pub fn activate_at(
        preferences: Preferences,
        seed: Option<&SeedData>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        options: MonitorOptions,
        now: OffsetDateTime,
    ) -> Self {
        let tracker = ReadingTracker::activate(preferences, seed, now, options.tracker)
            .into_shared();
        let poller = Arc::new(PollScheduler::new(
            Arc::clone(&tracker),
            fetcher,
            options.poll,
        ));

        Self {
            tracker,
            poller,
            notifier,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The shared tracker.
    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    /// The poll scheduler.
    pub fn poller(&self) -> &Arc<PollScheduler> {
        &self.poller
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the poll loop and the notification dispatcher.
    ///
    /// The poll loop runs its activation cycle immediately.
    pub async fn start(&self) {
        let dispatcher =
            NotificationDispatcher::new(Arc::clone(&self.tracker), Arc::clone(&self.notifier))
                .await;

        let poll_task = tokio::spawn(Arc::clone(&self.poller).run(self.cancel.child_token()));
        let dispatch_task = tokio::spawn(dispatcher.run(self.cancel.child_token()));

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([poll_task, dispatch_task]);
        info!("Monitor started");
    }

    /// Stop the background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("Monitor stopped");
    }
}
