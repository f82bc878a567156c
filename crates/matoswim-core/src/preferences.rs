//! Durable settings and last known reading.
//!
//! The persistence substrate is an external key-value store reached through
//! [`KeyValueStore`]. [`Preferences`] layers the typed keys on top of it.
//! Writes are best-effort: callers log failures and keep going.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use time::{Date, OffsetDateTime, UtcOffset};
use tracing::debug;

use matoswim_types::{
    Reading, ReadingSource, format_rfc3339, format_value, parse_rfc3339, parse_time_of_day,
    parse_value,
};

use crate::error::PersistenceError;

/// Persisted key names.
pub mod keys {
    /// Last accepted temperature, one-decimal string.
    pub const LAST_WATER_TEMPERATURE: &str = "lastWaterTemperature";
    /// Acquisition time of the last reading, `HH:mm:ss`.
    pub const LAST_UPDATED_TIME: &str = "lastUpdatedTime";
    /// Acquisition time of the last reading, RFC 3339.
    pub const LAST_UPDATED_AT: &str = "lastUpdatedAt";
    /// Alert threshold in degrees Celsius.
    pub const TEMPERATURE_THRESHOLD: &str = "temperatureThreshold";
    /// Whether alerts are enabled.
    pub const NOTIFICATIONS_ENABLED: &str = "notificationsEnabled";
}

/// Threshold used when none has been stored.
pub const DEFAULT_THRESHOLD: f64 = 18.0;

/// A string key-value store that survives restarts.
pub trait KeyValueStore: Send {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Write several values as one unit: either all of them are stored or
    /// none is.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), PersistenceError>;
}

/// In-memory [`KeyValueStore`].
///
/// Clones share the same map, so a test can hand one clone to a tracker and
/// inspect or reuse the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let values = self
            .values
            .lock()
            .map_err(|_| PersistenceError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| PersistenceError::Unavailable("memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), PersistenceError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| PersistenceError::Unavailable("memory store lock poisoned".to_string()))?;
        for (key, value) in entries {
            values.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }
}

/// Typed access to the persisted keys.
pub struct Preferences {
    store: Box<dyn KeyValueStore>,
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}

impl Preferences {
    /// Wrap a key-value store.
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Restore the last persisted reading.
    ///
    /// The full timestamp comes from `lastUpdatedAt` when present. Stores
    /// that only hold `lastUpdatedTime` get that time of day on `today` in
    /// `offset`. With neither, `fallback` is used.
    pub fn last_reading(
        &self,
        today: Date,
        offset: UtcOffset,
        fallback: OffsetDateTime,
    ) -> Result<Option<Reading>, PersistenceError> {
        let Some(raw) = self.store.get(keys::LAST_WATER_TEMPERATURE)? else {
            return Ok(None);
        };
        let value = parse_value(&raw).map_err(|source| PersistenceError::Corrupt {
            key: keys::LAST_WATER_TEMPERATURE,
            source,
        })?;

        let timestamp = if let Some(at) = self.store.get(keys::LAST_UPDATED_AT)? {
            parse_rfc3339(&at).map_err(|source| PersistenceError::Corrupt {
                key: keys::LAST_UPDATED_AT,
                source,
            })?
        } else if let Some(time) = self.store.get(keys::LAST_UPDATED_TIME)? {
            let time = parse_time_of_day(&time).map_err(|source| PersistenceError::Corrupt {
                key: keys::LAST_UPDATED_TIME,
                source,
            })?;
            today.with_time(time).assume_offset(offset)
        } else {
            fallback
        };

        Ok(Some(
            Reading::new(value, timestamp).with_source(ReadingSource::Persisted),
        ))
    }

    /// Persist a reading's value and acquisition time in one write.
    ///
    /// On failure the previously stored reading stays intact, value and
    /// timestamp together.
    pub fn save_reading(&self, reading: &Reading) -> Result<(), PersistenceError> {
        let value = reading.formatted_value();
        let time_of_day = reading.time_of_day();
        let updated_at = format_rfc3339(reading.timestamp);
        self.store.set_many(&[
            (keys::LAST_UPDATED_AT, &updated_at),
            (keys::LAST_UPDATED_TIME, &time_of_day),
            (keys::LAST_WATER_TEMPERATURE, &value),
        ])?;
        debug!("Persisted reading {}", reading);
        Ok(())
    }

    /// Stored threshold, or [`DEFAULT_THRESHOLD`].
    pub fn threshold(&self) -> Result<f64, PersistenceError> {
        match self.store.get(keys::TEMPERATURE_THRESHOLD)? {
            Some(raw) => parse_value(&raw).map_err(|source| PersistenceError::Corrupt {
                key: keys::TEMPERATURE_THRESHOLD,
                source,
            }),
            None => Ok(DEFAULT_THRESHOLD),
        }
    }

    /// Persist the threshold.
    pub fn save_threshold(&self, threshold: f64) -> Result<(), PersistenceError> {
        self.store
            .set(keys::TEMPERATURE_THRESHOLD, &format_value(threshold))
    }

    /// Stored notifications flag, or `false`.
    pub fn notifications_enabled(&self) -> Result<bool, PersistenceError> {
        Ok(self
            .store
            .get(keys::NOTIFICATIONS_ENABLED)?
            .is_some_and(|raw| raw.trim().eq_ignore_ascii_case("true")))
    }

    /// Persist the notifications flag.
    pub fn save_notifications_enabled(&self, enabled: bool) -> Result<(), PersistenceError> {
        self.store
            .set(keys::NOTIFICATIONS_ENABLED, if enabled { "true" } else { "false" })
    }
}
