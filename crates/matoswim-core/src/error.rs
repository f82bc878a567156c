//! Error types for matoswim-core.
//!
//! Every failure in the polling pipeline is recoverable. The poll scheduler
//! logs it and keeps its cadence; the tracker keeps the last good reading.
//!
//! | Error | Raised by | Effect |
//! |-------|-----------|--------|
//! | [`FetchError`] | [`crate::Fetcher`] | cycle skipped, reading retained |
//! | [`ExtractionError`] | [`crate::extract_temperature`] | cycle skipped, reading retained |
//! | [`PersistenceError`] | [`crate::KeyValueStore`] | logged, in-memory state still updated |
//! | [`NotificationDeliveryError`] | [`crate::Notifier`] | logged, cooldown clock not advanced |
//! | [`WakeError`] | [`crate::WakeRegistrar`] | logged, interval polling unaffected |

use thiserror::Error;

use matoswim_types::ParseError;

/// Failure to retrieve the source page.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request could not be sent or the connection failed.
    #[error("Navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body could not be read.
    #[error("Failed to read page content: {0}")]
    Body(#[source] reqwest::Error),

    /// The headless browser failed to launch, load, or evaluate the page.
    #[error("Browser rendering failed: {0}")]
    Render(String),

    /// The page source is unavailable for another reason.
    #[error("Page unavailable: {0}")]
    Unavailable(String),
}

/// Failure to find the water temperature in a page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtractionError {
    /// The sea temperature label does not appear in the page.
    #[error("Sea temperature label not found")]
    MarkerNotFound,

    /// The label is present but no degree sign follows it.
    #[error("No degree sign after the sea temperature label")]
    MissingDegreeSign,

    /// No digits between the label and the degree sign.
    #[error("No digits between the sea temperature label and the degree sign")]
    EmptyDigits,

    /// The digit run does not convert to a finite number.
    #[error("Temperature digits '{0}' are not a finite number")]
    NonFinite(String),
}

/// Failure of the key-value persistence substrate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistenceError {
    /// The backing store could not be read or written.
    #[error("Persistence store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be parsed.
    #[error("Stored value for '{key}' is invalid: {source}")]
    Corrupt {
        key: &'static str,
        #[source]
        source: ParseError,
    },
}

/// Failure to deliver a user notification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotificationDeliveryError {
    /// The user or platform has not granted notification permission.
    #[error("Notification permission denied")]
    PermissionDenied,

    /// The notification backend refused the notification.
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Failure to register a background wake with the host.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WakeError {
    /// The host refused the request.
    #[error("Background wake '{identifier}' rejected: {reason}")]
    Rejected { identifier: String, reason: String },
}

/// Failure to load the seed dataset.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SeedError {
    /// The dataset is not valid JSON of the expected shape.
    #[error("Invalid seed dataset: {0}")]
    Json(#[from] serde_json::Error),

    /// The dataset file could not be read.
    #[error("Failed to read seed dataset: {0}")]
    Io(#[from] std::io::Error),

    /// A key is not a `MM-DD` date or a value is not finite.
    #[error("Invalid seed entry '{key}': {reason}")]
    InvalidEntry { key: String, reason: String },
}
