//! Application state shared across handlers.
//!
//! # Broadcast Channel Behavior
//!
//! Accepted readings reach WebSocket clients through the poll scheduler's
//! broadcast channel:
//!
//! - **Buffer size**: Configurable via `server.broadcast_buffer` (default: 100)
//! - **Message loss**: A subscriber that falls behind skips the oldest readings
//! - **No blocking**: The poll cycle never waits for slow clients

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use matoswim_core::{Monitor, PollScheduler, SharedTracker, WakeRegistrar};

use crate::config::Config;
use crate::wake::TokioWakeRegistrar;

/// Shared application state.
pub struct AppState {
    /// The running monitor.
    pub monitor: Arc<Monitor>,
    /// Background wake registrar for lifecycle transitions.
    pub registrar: Arc<dyn WakeRegistrar>,
    /// Configuration in effect.
    pub config: RwLock<Config>,
    /// When the service started.
    pub started_at: OffsetDateTime,
}

impl AppState {
    /// Create new application state with wakes scheduled on the tokio
    /// runtime.
    pub fn new(monitor: Arc<Monitor>, config: Config) -> Arc<Self> {
        let registrar = TokioWakeRegistrar::new(Arc::clone(monitor.poller()));
        Self::with_registrar(monitor, config, registrar)
    }

    /// Create new application state with a custom wake registrar.
    pub fn with_registrar(
        monitor: Arc<Monitor>,
        config: Config,
        registrar: Arc<dyn WakeRegistrar>,
    ) -> Arc<Self> {
        Arc::new(Self {
            monitor,
            registrar,
            config: RwLock::new(config),
            started_at: OffsetDateTime::now_utc(),
        })
    }

    /// The shared tracker.
    pub fn tracker(&self) -> &SharedTracker {
        self.monitor.tracker()
    }

    /// The poll scheduler.
    pub fn poller(&self) -> &Arc<PollScheduler> {
        self.monitor.poller()
    }
}
