//! Debounced, rate-limited threshold alerts.
//!
//! [`NotificationScheduler`] is a plain state machine:
//!
//! ```text
//!            qualifying reading                 timer expiry
//!   Idle ─────────────────────────▶ Pending ─────────────────────▶ Idle
//!    ▲                               │  ▲                         (deliver if
//!    │  below threshold / disabled   │  │ newer qualifying          still valid
//!    └───────────────────────────────┘  └─ reading (supersede)      and cooled)
//! ```
//!
//! It never sleeps. Time is passed in, which keeps the superseding and
//! cooldown rules testable without timers. [`NotificationDispatcher`] is the
//! async driver that waits for the pending deadline and calls the
//! [`Notifier`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use matoswim_types::{Alert, Reading};

use crate::error::NotificationDeliveryError;
use crate::tracker::SharedTracker;

/// Delay between a qualifying reading and the alert.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

/// Minimum gap between two delivered alerts.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Delivers alerts to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show an alert.
    async fn notify(&self, alert: &Alert) -> Result<(), NotificationDeliveryError>;
}

/// Notifier that only writes the alert to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotificationDeliveryError> {
        info!("{}: {}", alert.title, alert.body);
        Ok(())
    }
}

/// State of the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationState {
    /// Nothing scheduled.
    Idle,
    /// An alert for `target` fires at `fire_at` unless superseded or cancelled.
    Pending { target: Reading, fire_at: Instant },
}

/// Result of [`NotificationScheduler::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Notifications are off; any pending alert was cancelled.
    Disabled { cancelled: bool },
    /// The reading is below the threshold; any pending alert was cancelled.
    BelowThreshold { cancelled: bool },
    /// An alert is scheduled, replacing an earlier one if `superseded`.
    Scheduled { fire_at: Instant, superseded: bool },
}

/// Why a due alert was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Notifications were disabled before the alert fired.
    Disabled,
    /// The threshold moved above the target value.
    BelowThreshold,
    /// The previous alert was delivered less than the cooldown ago.
    Cooldown { remaining: Duration },
}

/// Result of [`NotificationScheduler::take_due`].
#[derive(Debug, Clone, PartialEq)]
pub enum Due {
    /// Nothing is pending.
    Idle,
    /// An alert is pending but its deadline has not passed.
    NotYet { fire_at: Instant },
    /// The pending alert was dropped at re-check time.
    Suppressed(SuppressReason),
    /// The alert should be delivered now.
    Deliver(Alert),
}

/// Debounce and cooldown state machine.
#[derive(Debug)]
pub struct NotificationScheduler {
    state: NotificationState,
    debounce: Duration,
    cooldown: Duration,
    last_notification_time: Option<Instant>,
    timer: Arc<Notify>,
}

impl Default for NotificationScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, DEFAULT_COOLDOWN)
    }
}

impl NotificationScheduler {
    /// Create an idle scheduler.
    pub fn new(debounce: Duration, cooldown: Duration) -> Self {
        Self {
            state: NotificationState::Idle,
            debounce,
            cooldown,
            last_notification_time: None,
            timer: Arc::new(Notify::new()),
        }
    }

    /// Current state.
    pub fn state(&self) -> &NotificationState {
        &self.state
    }

    /// Deadline of the pending alert, if any.
    pub fn pending_deadline(&self) -> Option<Instant> {
        match &self.state {
            NotificationState::Pending { fire_at, .. } => Some(*fire_at),
            NotificationState::Idle => None,
        }
    }

    /// When the last alert was delivered.
    pub fn last_notification_time(&self) -> Option<Instant> {
        self.last_notification_time
    }

    /// Handle signalled whenever the pending deadline changes.
    pub fn timer(&self) -> Arc<Notify> {
        Arc::clone(&self.timer)
    }

    /// React to a newly accepted reading.
    pub fn evaluate(
        &mut self,
        reading: &Reading,
        threshold: f64,
        enabled: bool,
        now: Instant,
    ) -> Evaluation {
        if !enabled {
            return Evaluation::Disabled {
                cancelled: self.cancel(),
            };
        }

        if reading.value < threshold {
            return Evaluation::BelowThreshold {
                cancelled: self.cancel(),
            };
        }

        let superseded = matches!(self.state, NotificationState::Pending { .. });
        let fire_at = now + self.debounce;
        self.state = NotificationState::Pending {
            target: reading.clone(),
            fire_at,
        };
        self.timer.notify_one();

        debug!(
            "Alert for {}°C scheduled in {:?} (superseded: {})",
            reading.formatted_value(),
            self.debounce,
            superseded
        );
        Evaluation::Scheduled {
            fire_at,
            superseded,
        }
    }

    /// Drop any pending alert. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        let was_pending = matches!(self.state, NotificationState::Pending { .. });
        if was_pending {
            self.state = NotificationState::Idle;
            self.timer.notify_one();
            debug!("Pending alert cancelled");
        }
        was_pending
    }

    /// Re-check the pending alert once its deadline has passed.
    ///
    /// Any outcome other than [`Due::NotYet`] leaves the scheduler idle. The
    /// caller must report a successful delivery via
    /// [`record_delivery`](Self::record_delivery).
    pub fn take_due(&mut self, now: Instant, threshold: f64, enabled: bool) -> Due {
        let (target, fire_at) = match &self.state {
            NotificationState::Idle => return Due::Idle,
            NotificationState::Pending { target, fire_at } => (target.clone(), *fire_at),
        };

        if now < fire_at {
            return Due::NotYet { fire_at };
        }

        self.state = NotificationState::Idle;

        if !enabled {
            return Due::Suppressed(SuppressReason::Disabled);
        }
        if target.value < threshold {
            return Due::Suppressed(SuppressReason::BelowThreshold);
        }
        if let Some(last) = self.last_notification_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                return Due::Suppressed(SuppressReason::Cooldown {
                    remaining: self.cooldown - elapsed,
                });
            }
        }

        Due::Deliver(Alert::for_value(target.value))
    }

    /// Record a successful delivery at `now`.
    pub fn record_delivery(&mut self, now: Instant) {
        self.last_notification_time = Some(now);
    }
}

/// Async driver that fires pending alerts through a [`Notifier`].
pub struct NotificationDispatcher {
    tracker: SharedTracker,
    notifier: Arc<dyn Notifier>,
    timer: Arc<Notify>,
}

impl NotificationDispatcher {
    /// Create a dispatcher for a tracker.
    pub async fn new(tracker: SharedTracker, notifier: Arc<dyn Notifier>) -> Self {
        let timer = tracker.lock().await.notifications().timer();
        Self {
            tracker,
            notifier,
            timer,
        }
    }

    /// Wait for pending deadlines and deliver alerts until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Notification dispatcher started");

        loop {
            let deadline = self.tracker.lock().await.notifications().pending_deadline();

            let expiry = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.timer.notified() => continue,
                _ = expiry => {
                    self.fire_due().await;
                }
            }
        }

        info!("Notification dispatcher stopped");
    }

    /// Deliver the pending alert if it is due and still valid.
    ///
    /// Returns the delivered alert.
    pub async fn fire_due(&self) -> Option<Alert> {
        let due = self.tracker.lock().await.take_due_alert(Instant::now());

        let alert = match due {
            Due::Deliver(alert) => alert,
            Due::Suppressed(reason) => {
                debug!("Pending alert suppressed: {:?}", reason);
                return None;
            }
            Due::Idle | Due::NotYet { .. } => return None,
        };

        match self.notifier.notify(&alert).await {
            Ok(()) => {
                self.tracker
                    .lock()
                    .await
                    .record_notification_delivery(Instant::now());
                info!("Alert delivered: {}", alert.body);
                Some(alert)
            }
            Err(e) => {
                warn!("Failed to deliver alert: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn reading(value: f64) -> Reading {
        Reading::new(value, OffsetDateTime::UNIX_EPOCH)
    }

    fn scheduler() -> NotificationScheduler {
        NotificationScheduler::new(Duration::from_secs(10), Duration::from_secs(60))
    }

    #[test]
    fn test_disabled_never_schedules() {
        let mut s = scheduler();
        let now = Instant::now();
        assert_eq!(
            s.evaluate(&reading(25.0), 18.0, false, now),
            Evaluation::Disabled { cancelled: false }
        );
        assert_eq!(s.state(), &NotificationState::Idle);
    }

    #[test]
    fn test_below_threshold_never_schedules() {
        let mut s = scheduler();
        let now = Instant::now();
        for value in [-3.0, 0.0, 17.9, 17.99] {
            assert_eq!(
                s.evaluate(&reading(value), 18.0, true, now),
                Evaluation::BelowThreshold { cancelled: false }
            );
        }
        assert_eq!(s.take_due(now + Duration::from_secs(3600), 18.0, true), Due::Idle);
    }

    #[test]
    fn test_reaching_threshold_schedules_after_debounce() {
        let mut s = scheduler();
        let now = Instant::now();
        let evaluation = s.evaluate(&reading(18.0), 18.0, true, now);
        assert_eq!(
            evaluation,
            Evaluation::Scheduled {
                fire_at: now + Duration::from_secs(10),
                superseded: false
            }
        );
        assert_eq!(s.pending_deadline(), Some(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_not_due_before_deadline() {
        let mut s = scheduler();
        let now = Instant::now();
        s.evaluate(&reading(19.0), 18.0, true, now);
        assert_eq!(
            s.take_due(now + Duration::from_secs(9), 18.0, true),
            Due::NotYet {
                fire_at: now + Duration::from_secs(10)
            }
        );
        assert!(s.pending_deadline().is_some());
    }

    #[test]
    fn test_supersede_keeps_only_latest() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.evaluate(&reading(19.0), 18.0, true, t0);
        let evaluation = s.evaluate(&reading(20.0), 18.0, true, t0 + Duration::from_secs(2));
        assert!(matches!(
            evaluation,
            Evaluation::Scheduled {
                superseded: true,
                ..
            }
        ));

        // The superseded deadline passes without firing.
        assert!(matches!(
            s.take_due(t0 + Duration::from_secs(10), 18.0, true),
            Due::NotYet { .. }
        ));

        match s.take_due(t0 + Duration::from_secs(12), 18.0, true) {
            Due::Deliver(alert) => assert_eq!(alert.value, 20.0),
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(s.take_due(t0 + Duration::from_secs(30), 18.0, true), Due::Idle);
    }

    #[test]
    fn test_below_threshold_cancels_pending() {
        let mut s = scheduler();
        let now = Instant::now();
        s.evaluate(&reading(19.0), 18.0, true, now);
        assert_eq!(
            s.evaluate(&reading(17.0), 18.0, true, now),
            Evaluation::BelowThreshold { cancelled: true }
        );
        assert_eq!(s.take_due(now + Duration::from_secs(60), 18.0, true), Due::Idle);
    }

    #[test]
    fn test_disabled_at_recheck_suppresses() {
        let mut s = scheduler();
        let now = Instant::now();
        s.evaluate(&reading(19.0), 18.0, true, now);
        assert_eq!(
            s.take_due(now + Duration::from_secs(10), 18.0, false),
            Due::Suppressed(SuppressReason::Disabled)
        );
        assert_eq!(s.state(), &NotificationState::Idle);
    }

    #[test]
    fn test_threshold_raised_before_recheck_suppresses() {
        let mut s = scheduler();
        let now = Instant::now();
        s.evaluate(&reading(19.0), 18.0, true, now);
        assert_eq!(
            s.take_due(now + Duration::from_secs(10), 19.5, true),
            Due::Suppressed(SuppressReason::BelowThreshold)
        );
    }

    #[test]
    fn test_cooldown_suppresses_second_alert() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.evaluate(&reading(19.0), 18.0, true, t0);
        let fired = t0 + Duration::from_secs(10);
        assert!(matches!(s.take_due(fired, 18.0, true), Due::Deliver(_)));
        s.record_delivery(fired);

        s.evaluate(&reading(20.0), 18.0, true, t0 + Duration::from_secs(20));
        assert_eq!(
            s.take_due(t0 + Duration::from_secs(30), 18.0, true),
            Due::Suppressed(SuppressReason::Cooldown {
                remaining: Duration::from_secs(40)
            })
        );

        s.evaluate(&reading(21.0), 18.0, true, t0 + Duration::from_secs(60));
        assert!(matches!(
            s.take_due(t0 + Duration::from_secs(70), 18.0, true),
            Due::Deliver(_)
        ));
    }

    #[test]
    fn test_failed_delivery_does_not_start_cooldown() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.evaluate(&reading(19.0), 18.0, true, t0);
        assert!(matches!(
            s.take_due(t0 + Duration::from_secs(10), 18.0, true),
            Due::Deliver(_)
        ));
        // No record_delivery: the next alert is not held back.
        s.evaluate(&reading(20.0), 18.0, true, t0 + Duration::from_secs(11));
        assert!(matches!(
            s.take_due(t0 + Duration::from_secs(21), 18.0, true),
            Due::Deliver(_)
        ));
        assert!(s.last_notification_time().is_none());
    }

    #[test]
    fn test_cancel_when_idle() {
        let mut s = scheduler();
        assert!(!s.cancel());
    }

    #[tokio::test]
    async fn test_log_notifier() {
        let notifier = LogNotifier;
        assert!(notifier.notify(&Alert::for_value(19.0)).await.is_ok());
    }
}
