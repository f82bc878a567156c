//! Test doubles for the pipeline's external collaborators.
//!
//! - [`MockFetcher`]: scripted pages, failure injection and simulated latency
//! - [`RecordingNotifier`]: records alerts, optionally refuses them
//! - [`RecordingWakeRegistrar`]: records wake registrations
//!
//! # Example
//!
//! ```
//! use matoswim_core::{Fetcher, MockFetcher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let fetcher = MockFetcher::with_temperature(18.5);
//!     let page = fetcher.fetch().await.unwrap();
//!     assert_eq!(matoswim_core::extract_temperature(&page), Ok(18.5));
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use matoswim_types::Alert;

use crate::error::{FetchError, NotificationDeliveryError, WakeError};
use crate::fetch::Fetcher;
use crate::notify::Notifier;
use crate::wake::{WakeRegistrar, WakeRequest};

const MOCK_URL: &str = "mock://praia-de-matosinhos";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A minimal page carrying `value` the way the live page does.
///
/// The value is written in tenths of a degree, so only non-negative values
/// round-trip through extraction.
pub fn page_with_temperature(value: f64) -> String {
    format!(
        "<ul><li><h2>Temp. do mar</h2><p>{}º</p></li></ul>",
        (value * 10.0).round() as i64
    )
}

/// A [`Fetcher`] that serves scripted pages.
///
/// Queued pages are served first, in order. Once the queue is empty the
/// default page is served on every fetch.
#[derive(Debug, Default)]
pub struct MockFetcher {
    queue: Mutex<VecDeque<String>>,
    default_page: Mutex<Option<String>>,
    failing: AtomicBool,
    latency_ms: AtomicU64,
    fetch_count: AtomicU32,
    in_flight: AtomicU32,
    max_concurrent: AtomicU32,
}

struct InFlight<'a>(&'a AtomicU32);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockFetcher {
    /// Create a fetcher with no pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fetcher that always serves a page with `value`.
    pub fn with_temperature(value: f64) -> Self {
        let fetcher = Self::new();
        fetcher.set_default_page(page_with_temperature(value));
        fetcher
    }

    /// Queue a page for the next fetch.
    pub fn push_page(&self, page: impl Into<String>) {
        lock(&self.queue).push_back(page.into());
    }

    /// Set the page served once the queue is empty.
    pub fn set_default_page(&self, page: impl Into<String>) {
        *lock(&self.default_page) = Some(page.into());
    }

    /// Make every fetch fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of fetches started.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed in flight at once.
    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.max_concurrent.fetch_max(now_in_flight, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable("mock failure".to_string()));
        }

        if let Some(page) = lock(&self.queue).pop_front() {
            return Ok(page);
        }

        lock(&self.default_page)
            .clone()
            .ok_or_else(|| FetchError::Unavailable("no page scripted".to_string()))
    }

    fn url(&self) -> &str {
        MOCK_URL
    }
}

/// A [`Notifier`] that records every alert.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    /// Create a notifier that accepts every alert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make delivery fail with [`NotificationDeliveryError::PermissionDenied`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Alerts delivered so far.
    pub fn alerts(&self) -> Vec<Alert> {
        lock(&self.alerts).clone()
    }

    /// Number of alerts delivered.
    pub fn count(&self) -> usize {
        lock(&self.alerts).len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotificationDeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationDeliveryError::PermissionDenied);
        }
        lock(&self.alerts).push(alert.clone());
        Ok(())
    }
}

/// A [`WakeRegistrar`] that records requests.
#[derive(Debug, Default)]
pub struct RecordingWakeRegistrar {
    submitted: Mutex<Vec<WakeRequest>>,
    cancelled: Mutex<Vec<String>>,
    reject: bool,
}

impl RecordingWakeRegistrar {
    /// Create a registrar that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registrar that rejects every request.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Requests accepted so far.
    pub fn submitted(&self) -> Vec<WakeRequest> {
        lock(&self.submitted).clone()
    }

    /// Identifiers cancelled so far.
    pub fn cancelled(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }
}

impl WakeRegistrar for RecordingWakeRegistrar {
    fn submit(&self, request: WakeRequest) -> Result<(), WakeError> {
        if self.reject {
            return Err(WakeError::Rejected {
                identifier: request.identifier,
                reason: "background refresh disabled".to_string(),
            });
        }
        lock(&self.submitted).push(request);
        Ok(())
    }

    fn cancel(&self, identifier: &str) {
        lock(&self.cancelled).push(identifier.to_string());
    }
}
