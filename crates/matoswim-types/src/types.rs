//! Core types for water temperature readings.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, Time};

use crate::error::{ParseError, ParseResult};

/// Text shown by the display layer when no reading is known.
pub const NOT_AVAILABLE: &str = "not available";

/// Title used for every threshold alert.
pub const ALERT_TITLE: &str = "Water Temperature Alert";

/// Where a [`Reading`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReadingSource {
    /// Extracted from the live page during a poll cycle.
    Live,
    /// Restored from the persistence store at activation.
    Persisted,
    /// Taken from the bundled seed table for today's date.
    Seed,
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingSource::Live => write!(f, "live"),
            ReadingSource::Persisted => write!(f, "persisted"),
            ReadingSource::Seed => write!(f, "seed"),
        }
    }
}

/// A single water temperature value with its acquisition time.
///
/// Readings are immutable; a newer one either replaces the current reading
/// or is discarded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub value: f64,
    /// Wall-clock time of acquisition.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Origin of the value.
    pub source: ReadingSource,
}

impl Reading {
    /// Create a live reading.
    #[must_use]
    pub fn new(value: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            value,
            timestamp,
            source: ReadingSource::Live,
        }
    }

    /// Return the same reading tagged with a different source.
    #[must_use]
    pub fn with_source(mut self, source: ReadingSource) -> Self {
        self.source = source;
        self
    }

    /// The value formatted to one decimal place (e.g. `"18.5"`).
    #[must_use]
    pub fn formatted_value(&self) -> String {
        format_value(self.value)
    }

    /// The acquisition time as `HH:mm:ss`.
    #[must_use]
    pub fn time_of_day(&self) -> String {
        format_time_of_day(self.timestamp)
    }

    /// Whether two values are equal once formatted to one decimal place.
    ///
    /// This is the comparison used to discard unchanged readings.
    #[must_use]
    pub fn same_value(&self, other: &Reading) -> bool {
        self.formatted_value() == other.formatted_value()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°C at {}", self.formatted_value(), self.time_of_day())
    }
}

/// Outcome of submitting a candidate reading to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeResult {
    /// The value matched the current reading; nothing changed.
    Unchanged,
    /// The reading replaced the current one.
    Changed(Reading),
}

impl ChangeResult {
    /// Returns `true` for [`ChangeResult::Changed`].
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, ChangeResult::Changed(_))
    }
}

/// Notification content for a threshold crossing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Alert {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// The temperature that triggered the alert.
    pub value: f64,
}

impl Alert {
    /// Build the alert for a temperature value.
    ///
    /// # Examples
    ///
    /// ```
    /// use matoswim_types::Alert;
    ///
    /// let alert = Alert::for_value(20.0);
    /// assert_eq!(alert.title, "Water Temperature Alert");
    /// assert!(alert.body.contains("20.0°C"));
    /// ```
    #[must_use]
    pub fn for_value(value: f64) -> Self {
        Self {
            title: ALERT_TITLE.to_string(),
            body: format!(
                "The water temperature in Matosinhos is now {}°C!",
                format_value(value)
            ),
            value,
        }
    }
}

/// Display-ready view of the tracker state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackerSnapshot {
    /// Current value formatted to one decimal, if known.
    pub temperature: Option<String>,
    /// Text for the display layer: `"18.5°C"` or [`NOT_AVAILABLE`].
    pub display: String,
    /// Acquisition time of the current reading as `HH:mm:ss`.
    pub last_updated: Option<String>,
    /// Origin of the current reading.
    pub source: Option<ReadingSource>,
    /// Alert threshold in degrees Celsius.
    pub threshold: f64,
    /// Whether alerts are enabled.
    pub notifications_enabled: bool,
    /// Number of entries in the in-memory log.
    pub log_len: usize,
}

impl TrackerSnapshot {
    /// Build a snapshot from the current reading and settings.
    #[must_use]
    pub fn new(
        current: Option<&Reading>,
        threshold: f64,
        notifications_enabled: bool,
        log_len: usize,
    ) -> Self {
        Self {
            temperature: current.map(Reading::formatted_value),
            display: display_text(current),
            last_updated: current.map(Reading::time_of_day),
            source: current.map(|r| r.source),
            threshold,
            notifications_enabled,
            log_len,
        }
    }
}

/// Text the display layer renders for an optional reading.
#[must_use]
pub fn display_text(reading: Option<&Reading>) -> String {
    match reading {
        Some(r) => format!("{}°C", r.formatted_value()),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Format a temperature to one decimal place.
#[must_use]
pub fn format_value(value: f64) -> String {
    format!("{value:.1}")
}

/// Parse a stored temperature string such as `"18.5"`.
pub fn parse_value(s: &str) -> ParseResult<f64> {
    let trimmed = s.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| ParseError::InvalidTemperature(s.to_string()))?;
    if !value.is_finite() {
        return Err(ParseError::NonFinite(s.to_string()));
    }
    Ok(value)
}

/// Format a timestamp as `HH:mm:ss`.
#[must_use]
pub fn format_time_of_day(timestamp: OffsetDateTime) -> String {
    let format = format_description!("[hour]:[minute]:[second]");
    timestamp
        .format(&format)
        .unwrap_or_else(|_| timestamp.time().to_string())
}

/// Parse an `HH:mm:ss` time of day.
pub fn parse_time_of_day(s: &str) -> ParseResult<Time> {
    let format = format_description!("[hour]:[minute]:[second]");
    Time::parse(s.trim(), &format).map_err(|_| ParseError::InvalidTime(s.to_string()))
}

/// Format a timestamp as RFC 3339.
#[must_use]
pub fn format_rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.unix_timestamp().to_string())
}

/// Parse an RFC 3339 timestamp.
pub fn parse_rfc3339(s: &str) -> ParseResult<OffsetDateTime> {
    OffsetDateTime::parse(s.trim(), &Rfc3339).map_err(|_| ParseError::InvalidTime(s.to_string()))
}
