//! Shared data types for the Matosinhos water temperature monitor.
//!
//! This crate holds the types that cross crate boundaries: the
//! [`Reading`] produced by a poll cycle, the [`ChangeResult`] returned by
//! the tracker, the [`Alert`] handed to notifiers, and the
//! [`TrackerSnapshot`] rendered by the display layer.
//!
//! # Example
//!
//! ```
//! use matoswim_types::{Reading, TrackerSnapshot};
//! use time::OffsetDateTime;
//!
//! let reading = Reading::new(18.5, OffsetDateTime::now_utc());
//! let snapshot = TrackerSnapshot::new(Some(&reading), 18.0, true, 1);
//! assert_eq!(snapshot.display, "18.5°C");
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    ALERT_TITLE, Alert, ChangeResult, NOT_AVAILABLE, Reading, ReadingSource, TrackerSnapshot,
    display_text, format_rfc3339, format_time_of_day, format_value, parse_rfc3339,
    parse_time_of_day, parse_value,
};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn formatted_value_parses_back_within_rounding(value in -5.0f64..40.0) {
            let parsed = parse_value(&format_value(value)).unwrap();
            prop_assert!((parsed - value).abs() <= 0.05 + 1e-9);
        }

        #[test]
        fn same_value_is_reflexive(value in -5.0f64..40.0) {
            let reading = Reading::new(value, time::OffsetDateTime::UNIX_EPOCH);
            prop_assert!(reading.same_value(&reading.clone()));
        }
    }
}
