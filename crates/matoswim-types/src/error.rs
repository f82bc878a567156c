//! Error types for parsing persisted and displayed values.

use thiserror::Error;

/// Errors that can occur when parsing stored temperature data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// The text is not a decimal temperature.
    #[error("Invalid temperature: '{0}'")]
    InvalidTemperature(String),

    /// The temperature parsed but is NaN or infinite.
    #[error("Temperature is not a finite number: '{0}'")]
    NonFinite(String),

    /// The text is not a valid `HH:mm:ss` or RFC 3339 time.
    #[error("Invalid time: '{0}'")]
    InvalidTime(String),
}

/// Result type alias using matoswim-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
