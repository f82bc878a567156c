//! Static fallback temperatures keyed by calendar day.
//!
//! The bundled dataset has the shape
//! `{ "temperatures": { "MM-DD": <decimal>, ... } }` and is only consulted at
//! activation when nothing has been persisted yet.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use time::Date;

use crate::error::SeedError;

const BUNDLED_DATASET: &str = include_str!("../assets/seed_temperatures.json");

#[derive(Debug, Deserialize)]
struct SeedFile {
    temperatures: BTreeMap<String, f64>,
}

/// Seed temperature table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedData {
    temperatures: BTreeMap<String, f64>,
}

impl SeedData {
    /// Load the dataset compiled into the crate.
    pub fn bundled() -> Result<Self, SeedError> {
        Self::from_json(BUNDLED_DATASET)
    }

    /// Parse a dataset from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::InvalidEntry`] if a key is not a valid `MM-DD`
    /// date or a value is not finite.
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        let file: SeedFile = serde_json::from_str(json)?;
        for (key, value) in &file.temperatures {
            validate_key(key)?;
            if !value.is_finite() {
                return Err(SeedError::InvalidEntry {
                    key: key.clone(),
                    reason: "value is not finite".to_string(),
                });
            }
        }
        Ok(Self {
            temperatures: file.temperatures,
        })
    }

    /// Load a dataset from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SeedError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build a table from `(MM-DD, value)` pairs without validation.
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            temperatures: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Seed temperature for a calendar date, if the table has one.
    pub fn value_for(&self, date: Date) -> Option<f64> {
        self.temperatures.get(&month_day_key(date)).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.temperatures.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.temperatures.is_empty()
    }
}

/// `MM-DD` key for a date.
pub fn month_day_key(date: Date) -> String {
    format!("{:02}-{:02}", u8::from(date.month()), date.day())
}

fn validate_key(key: &str) -> Result<(), SeedError> {
    let invalid = |reason: &str| SeedError::InvalidEntry {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let (month, day) = key
        .split_once('-')
        .ok_or_else(|| invalid("expected MM-DD"))?;
    if month.len() != 2 || day.len() != 2 {
        return Err(invalid("expected MM-DD"));
    }
    let month: u8 = month.parse().map_err(|_| invalid("month is not a number"))?;
    let day: u8 = day.parse().map_err(|_| invalid("day is not a number"))?;
    let month = time::Month::try_from(month).map_err(|_| invalid("month out of range"))?;

    // 2024 is a leap year, so 02-29 is accepted.
    Date::from_calendar_date(2024, month, day).map_err(|_| invalid("day out of range"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_bundled_dataset_covers_every_day() {
        let seed = SeedData::bundled().unwrap();
        assert_eq!(seed.len(), 366);
        assert!(seed.value_for(date!(2024 - 02 - 29)).is_some());
        assert!(seed.value_for(date!(2025 - 12 - 31)).is_some());
    }

    #[test]
    fn test_bundled_values_are_plausible() {
        let seed = SeedData::bundled().unwrap();
        let summer = seed.value_for(date!(2024 - 08 - 20)).unwrap();
        let winter = seed.value_for(date!(2024 - 02 - 20)).unwrap();
        assert!(summer > winter);
        assert!((10.0..25.0).contains(&summer));
        assert!((10.0..25.0).contains(&winter));
    }

    #[test]
    fn test_month_day_key() {
        assert_eq!(month_day_key(date!(2024 - 07 - 06)), "07-06");
        assert_eq!(month_day_key(date!(2023 - 12 - 25)), "12-25");
    }

    #[test]
    fn test_from_json() {
        let seed = SeedData::from_json(r#"{ "temperatures": { "07-26": 18.5 } }"#).unwrap();
        assert_eq!(seed.value_for(date!(2024 - 07 - 26)), Some(18.5));
        assert_eq!(seed.value_for(date!(2024 - 07 - 27)), None);
    }

    #[test]
    fn test_from_json_rejects_bad_keys() {
        for json in [
            r#"{ "temperatures": { "7-26": 18.5 } }"#,
            r#"{ "temperatures": { "13-01": 18.5 } }"#,
            r#"{ "temperatures": { "02-30": 18.5 } }"#,
            r#"{ "temperatures": { "July": 18.5 } }"#,
        ] {
            assert!(
                matches!(SeedData::from_json(json), Err(SeedError::InvalidEntry { .. })),
                "accepted {json}"
            );
        }
    }

    #[test]
    fn test_from_json_rejects_wrong_shape() {
        assert!(matches!(
            SeedData::from_json(r#"{ "temps": {} }"#),
            Err(SeedError::Json(_))
        ));
    }

    #[test]
    fn test_empty_table() {
        let seed = SeedData::default();
        assert!(seed.is_empty());
        assert_eq!(seed.value_for(date!(2024 - 01 - 01)), None);
    }
}
