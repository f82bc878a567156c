//! REST API endpoints for matoswim-service.
//!
//! This module exposes the monitor's state and controls over HTTP.
//!
//! # Concurrency and Lock Acquisition
//!
//! - **tracker** (Mutex): Held only to copy out a snapshot or to apply a
//!   settings change. Never held across a poll cycle.
//! - **`state.config`** (RwLock): Read lock for the status endpoint.
//!
//! A refresh runs its cycle through the poll scheduler, which serializes it
//! with any interval or wake cycle already in flight.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use matoswim_core::{CycleOutcome, PollStats, Reading, TrackerSnapshot};

use crate::state::AppState;

/// Lowest threshold the settings endpoint accepts.
pub const MIN_THRESHOLD: f64 = 12.0;
/// Highest threshold the settings endpoint accepts.
pub const MAX_THRESHOLD: f64 = 22.0;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/temperature", get(get_temperature))
        .route("/api/log", get(get_log))
        .route("/api/refresh", post(refresh))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/lifecycle", post(lifecycle))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Page being polled.
    pub source_url: String,
    /// Seconds between foreground polls.
    pub interval_secs: u64,
    /// Seconds since the service started.
    pub uptime_secs: i64,
    /// Whether an alert is waiting for its debounce to expire.
    pub alert_pending: bool,
    /// Poll counters.
    pub polling: PollStats,
}

/// Poll statistics and service info.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (source_url, interval_secs) = {
        let config = state.config.read().await;
        (config.source.url.clone(), config.polling.interval_secs)
    };
    let alert_pending = state.tracker().lock().await.pending_deadline().is_some();

    Json(StatusResponse {
        source_url,
        interval_secs,
        uptime_secs: (OffsetDateTime::now_utc() - state.started_at).whole_seconds(),
        alert_pending,
        polling: state.poller().stats(),
    })
}

/// Current reading as the display layer renders it.
async fn get_temperature(State(state): State<Arc<AppState>>) -> Json<TrackerSnapshot> {
    Json(state.tracker().lock().await.snapshot())
}

/// In-memory log of accepted readings.
#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub count: usize,
    pub readings: Vec<Reading>,
}

/// Accepted readings in arrival order.
async fn get_log(State(state): State<Arc<AppState>>) -> Json<LogResponse> {
    let readings: Vec<Reading> = state.tracker().lock().await.log().cloned().collect();
    Json(LogResponse {
        count: readings.len(),
        readings,
    })
}

/// Result of a user-initiated refresh.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub result: CycleOutcome,
    pub temperature: TrackerSnapshot,
}

/// Run a poll cycle now.
///
/// Failures are reported in the body; the previous reading stays current.
async fn refresh(State(state): State<Arc<AppState>>) -> Json<RefreshResponse> {
    let result = state.poller().refresh().await;
    let temperature = state.tracker().lock().await.snapshot();
    Json(RefreshResponse {
        result,
        temperature,
    })
}

/// Alert settings.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub threshold: f64,
    pub notifications_enabled: bool,
}

/// Current alert settings.
async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    let tracker = state.tracker().lock().await;
    Json(SettingsResponse {
        threshold: tracker.threshold(),
        notifications_enabled: tracker.notifications_enabled(),
    })
}

/// Request to change alert settings. Omitted fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub threshold: Option<f64>,
    pub notifications_enabled: Option<bool>,
}

/// Check a threshold against the picker range and step.
fn validate_threshold(threshold: f64) -> Result<(), AppError> {
    if !threshold.is_finite() || !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&threshold) {
        return Err(AppError::BadRequest(format!(
            "threshold {} out of range ({:.1}-{:.1})",
            threshold, MIN_THRESHOLD, MAX_THRESHOLD
        )));
    }
    if ((threshold * 10.0).round() / 10.0 - threshold).abs() > 1e-9 {
        return Err(AppError::BadRequest(format!(
            "threshold {} must have at most one decimal place",
            threshold
        )));
    }
    Ok(())
}

/// Update alert settings.
///
/// # Errors
///
/// Returns [`AppError::BadRequest`] if the threshold is outside 12.0-22.0 or
/// has more than one decimal place. Nothing is changed in that case.
async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    if let Some(threshold) = request.threshold {
        validate_threshold(threshold)?;
    }

    let mut tracker = state.tracker().lock().await;
    if let Some(threshold) = request.threshold {
        tracker.set_threshold(threshold);
    }
    if let Some(enabled) = request.notifications_enabled {
        tracker.set_notifications_enabled(enabled);
    }

    Ok(Json(SettingsResponse {
        threshold: tracker.threshold(),
        notifications_enabled: tracker.notifications_enabled(),
    }))
}

/// Process lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Foreground,
    Background,
}

/// Lifecycle transition request.
#[derive(Debug, Deserialize)]
pub struct LifecycleRequest {
    pub phase: Phase,
}

/// Lifecycle transition result.
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub phase: Phase,
    /// Whether interval polling is running.
    pub active: bool,
    /// Whether a background wake was registered by this transition.
    pub wake_registered: bool,
    /// Why the host refused the background wake, if it did.
    pub wake_error: Option<String>,
}

/// Move between foreground and background.
///
/// Entering the background pauses interval polling and registers a wake.
/// Entering the foreground cancels the wake and polls right away.
async fn lifecycle(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LifecycleRequest>,
) -> Json<LifecycleResponse> {
    let poller = state.poller();
    let registrar = state.registrar.as_ref();

    let wake_error = match request.phase {
        Phase::Background => poller
            .enter_background(registrar)
            .err()
            .map(|e| e.to_string()),
        Phase::Foreground => {
            poller.enter_foreground(registrar);
            None
        }
    };
    info!("Lifecycle phase: {:?}", request.phase);

    Json(LifecycleResponse {
        phase: request.phase,
        active: poller.is_active(),
        wake_registered: request.phase == Phase::Background && wake_error.is_none(),
        wake_error,
    })
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
