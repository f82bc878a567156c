//! Water temperature monitoring for Praia de Matosinhos.
//!
//! This crate implements the retrieve → parse → dedupe → persist → notify
//! pipeline behind the monitor:
//!
//! - **Fetching**: download the beach webcam page ([`Fetcher`], [`HttpFetcher`])
//! - **Extraction**: find the sea temperature in the markup ([`extract_temperature`])
//! - **Change tracking**: keep the latest reading and an in-memory log ([`ReadingTracker`])
//! - **Persistence**: remember the last reading and the settings ([`Preferences`])
//! - **Alerts**: debounced, rate-limited threshold notifications ([`NotificationScheduler`])
//! - **Scheduling**: interval polling, refresh and background wakes ([`PollScheduler`])
//!
//! # Pipeline
//!
//! | Stage | Type | On failure |
//! |-------|------|------------|
//! | fetch | [`Fetcher`] | cycle skipped |
//! | extract | [`extract_temperature`] | cycle skipped |
//! | submit | [`ReadingTracker::submit`] | n/a |
//! | persist | [`KeyValueStore`] | logged |
//! | notify | [`Notifier`] | logged, retried on the next qualifying reading |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use matoswim_core::{
//!     FetchOptions, HttpFetcher, LogNotifier, MemoryStore, Monitor, Preferences, SeedData,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let seed = SeedData::bundled()?;
//!     let monitor = Monitor::new(
//!         Preferences::new(MemoryStore::new()),
//!         Some(&seed),
//!         Arc::new(HttpFetcher::new(&FetchOptions::default())?),
//!         Arc::new(LogNotifier),
//!         Default::default(),
//!     );
//!     monitor.start().await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     monitor.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod extract;
pub mod fetch;
pub mod mock;
pub mod monitor;
pub mod notify;
pub mod poll;
pub mod preferences;
#[cfg(feature = "render")]
pub mod render;
pub mod seed;
pub mod tracker;
pub mod wake;

pub use error::{
    ExtractionError, FetchError, NotificationDeliveryError, PersistenceError, SeedError,
    WakeError,
};
pub use extract::{SEA_TEMPERATURE_LABEL, extract_temperature};
pub use fetch::{FetchOptions, Fetcher, HttpFetcher, SOURCE_URL};
pub use mock::{MockFetcher, RecordingNotifier, RecordingWakeRegistrar, page_with_temperature};
pub use monitor::{Monitor, MonitorOptions};
pub use notify::{
    Due, Evaluation, LogNotifier, NotificationDispatcher, NotificationScheduler,
    NotificationState, Notifier, SuppressReason,
};
pub use poll::{CycleOutcome, PollOptions, PollScheduler, PollStats, local_now};
pub use preferences::{DEFAULT_THRESHOLD, KeyValueStore, MemoryStore, Preferences, keys};
#[cfg(feature = "render")]
pub use render::RenderingFetcher;
pub use seed::SeedData;
pub use tracker::{ReadingTracker, SharedTracker, TrackerOptions};
pub use wake::{DEFAULT_WAKE_IDENTIFIER, WakeRegistrar, WakeRequest};

// Re-export from matoswim-types
pub use matoswim_types::{Alert, ChangeResult, NOT_AVAILABLE, Reading, ReadingSource, TrackerSnapshot};
