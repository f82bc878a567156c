//! Poll scheduling: fetch, extract and submit on a cadence.
//!
//! A cycle runs
//!
//! - once at activation (the first interval tick completes immediately),
//! - every interval while the process is active,
//! - on explicit refresh,
//! - once per background wake, bounded by the wake budget.
//!
//! Cycles never overlap. A trigger that arrives while a cycle is in flight
//! waits for it and then runs its own.

use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use matoswim_types::{ChangeResult, Reading};

use crate::error::WakeError;
use crate::extract::extract_temperature;
use crate::fetch::Fetcher;
use crate::tracker::SharedTracker;
use crate::wake::{DEFAULT_WAKE_IDENTIFIER, WakeRegistrar, WakeRequest};

/// Foreground polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Execution budget of a background wake.
pub const DEFAULT_WAKE_BUDGET: Duration = Duration::from_secs(30);

/// Capacity of the reading broadcast channel.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 100;

/// Current wall-clock time in the local offset.
///
/// Falls back to UTC when the local offset cannot be determined (for
/// example in a multi-threaded process on some Unix platforms).
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Tuning for a [`PollScheduler`].
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Time between foreground cycles; also the minimum wake delay.
    pub interval: Duration,
    /// Time a background cycle may take before it is abandoned.
    pub wake_budget: Duration,
    /// Identifier used for wake registration.
    pub wake_identifier: String,
    /// Capacity of the reading broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            wake_budget: DEFAULT_WAKE_BUDGET,
            wake_identifier: DEFAULT_WAKE_IDENTIFIER.to_string(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A new reading was accepted.
    Updated(Reading),
    /// The extracted value matched the current reading.
    Unchanged,
    /// The page could not be retrieved.
    FetchFailed(String),
    /// The page did not contain a usable temperature.
    ExtractionFailed(String),
    /// The cycle exceeded its budget and was abandoned.
    TimedOut,
}

impl CycleOutcome {
    /// Whether the cycle failed.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CycleOutcome::FetchFailed(_) | CycleOutcome::ExtractionFailed(_) | CycleOutcome::TimedOut
        )
    }
}

/// Counters kept across cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollStats {
    /// Completed or abandoned cycles.
    pub cycles: u64,
    /// Cycles that accepted a new reading.
    pub updates: u64,
    /// Cycles whose value matched the current reading.
    pub unchanged: u64,
    /// Cycles that failed to fetch or extract.
    pub failures: u64,
    /// Failed or abandoned cycles since the last success.
    pub consecutive_failures: u32,
    /// Cycles abandoned at the wake budget.
    pub timeouts: u64,
    /// Time of the last successful cycle.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    /// Time of the last failed cycle.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Message of the last failure.
    pub last_error: Option<String>,
    /// Whether interval polling is running.
    pub active: bool,
}

/// Drives poll cycles for one tracker.
pub struct PollScheduler {
    tracker: SharedTracker,
    fetcher: Arc<dyn Fetcher>,
    options: PollOptions,
    cycle_lock: Mutex<()>,
    stats: std::sync::Mutex<PollStats>,
    active: watch::Sender<bool>,
    readings_tx: broadcast::Sender<Reading>,
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("url", &self.fetcher.url())
            .field("options", &self.options)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl PollScheduler {
    /// Create a scheduler in the active state.
    pub fn new(tracker: SharedTracker, fetcher: Arc<dyn Fetcher>, options: PollOptions) -> Self {
        let (readings_tx, _) = broadcast::channel(options.broadcast_capacity.max(1));
        let (active, _) = watch::channel(true);
        Self {
            tracker,
            fetcher,
            options,
            cycle_lock: Mutex::new(()),
            stats: std::sync::Mutex::new(PollStats {
                active: true,
                ..Default::default()
            }),
            active,
            readings_tx,
        }
    }

    /// The tracker this scheduler feeds.
    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    /// Scheduler options.
    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Receive every accepted reading.
    pub fn subscribe(&self) -> broadcast::Receiver<Reading> {
        self.readings_tx.subscribe()
    }

    /// Snapshot of the cycle counters.
    pub fn stats(&self) -> PollStats {
        self.stats_mut().clone()
    }

    /// Whether interval polling is running.
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    fn stats_mut(&self) -> MutexGuard<'_, PollStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one cycle, waiting for any cycle already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;
        let outcome = self.fetch_and_submit().await;
        self.record(&outcome);
        outcome
    }

    /// Run one cycle, abandoning it after `budget`.
    ///
    /// Tracker mutation happens synchronously under the tracker lock, so an
    /// abandoned cycle leaves the tracker either untouched or fully updated.
    pub async fn run_cycle_with_budget(&self, budget: Duration) -> CycleOutcome {
        match timeout(budget, self.run_cycle()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let outcome = CycleOutcome::TimedOut;
                self.record(&outcome);
                outcome
            }
        }
    }

    /// User-initiated refresh; returns the outcome of its cycle.
    pub async fn refresh(&self) -> CycleOutcome {
        info!("Refresh requested");
        self.run_cycle().await
    }

    /// Handle a background wake: re-arm the next wake, then run one
    /// budgeted cycle.
    pub async fn handle_background_wake(&self, registrar: &dyn WakeRegistrar) -> CycleOutcome {
        debug!("Background wake");
        if let Err(e) = registrar.submit(self.wake_request()) {
            warn!("Failed to re-arm background wake: {}", e);
        }
        self.run_cycle_with_budget(self.options.wake_budget).await
    }

    /// Pause interval polling and register a background wake.
    pub fn enter_background(&self, registrar: &dyn WakeRegistrar) -> Result<(), WakeError> {
        self.set_active(false);
        info!("Entered background, interval polling paused");
        registrar.submit(self.wake_request()).inspect_err(|e| {
            warn!("Failed to register background wake: {}", e);
        })
    }

    /// Resume interval polling and drop the background wake.
    ///
    /// The run loop restarts the interval and runs a cycle right away.
    pub fn enter_foreground(&self, registrar: &dyn WakeRegistrar) {
        registrar.cancel(&self.options.wake_identifier);
        self.set_active(true);
        info!("Entered foreground, interval polling resumed");
    }

    fn set_active(&self, active: bool) {
        self.active.send_replace(active);
        self.stats_mut().active = active;
    }

    fn wake_request(&self) -> WakeRequest {
        WakeRequest::new(self.options.wake_identifier.clone(), self.options.interval)
    }

    /// Poll until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Polling {} every {}s",
            self.fetcher.url(),
            self.options.interval.as_secs()
        );

        let mut ticker = interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut active_rx = self.active.subscribe();

        loop {
            let active = *active_rx.borrow_and_update();

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick(), if active => {
                    self.run_cycle().await;
                }
                changed = active_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *active_rx.borrow_and_update() {
                        ticker.reset();
                        self.run_cycle().await;
                    }
                }
            }
        }

        info!("Polling stopped");
    }

    async fn fetch_and_submit(&self) -> CycleOutcome {
        let page = match self.fetcher.fetch().await {
            Ok(page) => page,
            Err(e) => return CycleOutcome::FetchFailed(e.to_string()),
        };

        let value = match extract_temperature(&page) {
            Ok(value) => value,
            Err(e) => return CycleOutcome::ExtractionFailed(e.to_string()),
        };

        let reading = Reading::new(value, local_now());
        let result = self.tracker.lock().await.submit(reading, Instant::now());

        match result {
            ChangeResult::Changed(reading) => {
                // No subscribers is fine.
                let _ = self.readings_tx.send(reading.clone());
                CycleOutcome::Updated(reading)
            }
            ChangeResult::Unchanged => CycleOutcome::Unchanged,
        }
    }

    fn record(&self, outcome: &CycleOutcome) {
        let now = local_now();
        let mut stats = self.stats_mut();
        stats.cycles += 1;

        let message = match outcome {
            CycleOutcome::Updated(_) | CycleOutcome::Unchanged => {
                if matches!(outcome, CycleOutcome::Updated(_)) {
                    stats.updates += 1;
                } else {
                    stats.unchanged += 1;
                }
                if stats.consecutive_failures > 0 {
                    info!(
                        "Polling recovered after {} failed cycle(s)",
                        stats.consecutive_failures
                    );
                }
                stats.consecutive_failures = 0;
                stats.last_success_at = Some(now);
                return;
            }
            CycleOutcome::FetchFailed(e) => {
                stats.failures += 1;
                format!("Fetch failed: {}", e)
            }
            CycleOutcome::ExtractionFailed(e) => {
                stats.failures += 1;
                format!("Extraction failed: {}", e)
            }
            CycleOutcome::TimedOut => {
                stats.timeouts += 1;
                format!(
                    "Cycle exceeded its {}s budget",
                    self.options.wake_budget.as_secs()
                )
            }
        };

        stats.consecutive_failures += 1;
        stats.last_error_at = Some(now);

        let attempt = stats.consecutive_failures;
        if attempt <= 3 {
            warn!("{} (attempt {})", message, attempt);
        } else if attempt == 4 {
            error!(
                "{} after {} attempts, will continue trying silently",
                message, attempt
            );
        }
        stats.last_error = Some(message);
    }
}
