//! HTTP service for the Matosinhos water temperature monitor.
//!
//! This crate provides a service that:
//! - Polls the beach webcam page on a schedule
//! - Remembers the last reading and the alert settings in the local database
//! - Sends debounced threshold alerts
//! - Exposes a REST API for the current reading and the settings
//! - Provides WebSocket connections for real-time updates
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Poll statistics
//! - `GET /api/temperature` - Current reading
//! - `GET /api/log` - Readings accepted since startup
//! - `POST /api/refresh` - Poll now
//! - `GET /api/settings` / `PUT /api/settings` - Alert threshold and switch
//! - `POST /api/lifecycle` - Foreground/background transitions
//! - `WS /api/ws` - Real-time readings stream
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/matoswim/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/matoswim/data.db"
//!
//! [source]
//! renderer = "browser"  # or "http"
//!
//! [polling]
//! interval_secs = 900
//!
//! [notifications]
//! debounce_secs = 10
//! cooldown_secs = 60
//! desktop = true
//! ```

pub mod api;
pub mod config;
pub mod notifier;
pub mod persistence;
pub mod state;
pub mod wake;
pub mod ws;

pub use config::{
    Config, ConfigError, NotificationsConfig, PollingConfig, Renderer, ServerConfig,
    SourceConfig, StorageConfig, TrackerConfig, ValidationError,
};
#[cfg(feature = "notifications")]
pub use notifier::DesktopNotifier;
pub use persistence::SqliteKeyValueStore;
pub use state::AppState;
pub use wake::TokioWakeRegistrar;
pub use ws::WsEvent;
