//! Background wake registration.
//!
//! While the process is in the background the interval timer is paused and
//! the host is asked to wake it once after a minimum delay. Each wake runs
//! one budgeted poll cycle and re-arms the next one.

use std::time::Duration;

use crate::error::WakeError;

/// Identifier under which the poll task is registered.
pub const DEFAULT_WAKE_IDENTIFIER: &str = "pt.matoswim.fetchTemperature";

/// A request to run the poll task once, no earlier than `earliest_begin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeRequest {
    /// Task identifier.
    pub identifier: String,
    /// Minimum delay before the host may run the task.
    pub earliest_begin: Duration,
}

impl WakeRequest {
    /// Create a request.
    pub fn new(identifier: impl Into<String>, earliest_begin: Duration) -> Self {
        Self {
            identifier: identifier.into(),
            earliest_begin,
        }
    }
}

/// Host facility that wakes the process for background work.
///
/// Submitting a request with an identifier that is already registered
/// replaces the earlier request.
pub trait WakeRegistrar: Send + Sync {
    /// Register a one-shot wake.
    fn submit(&self, request: WakeRequest) -> Result<(), WakeError>;

    /// Drop any registered wake for `identifier`.
    fn cancel(&self, identifier: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_request() {
        let request = WakeRequest::new(DEFAULT_WAKE_IDENTIFIER, Duration::from_secs(900));
        assert_eq!(request.identifier, "pt.matoswim.fetchTemperature");
        assert_eq!(request.earliest_begin, Duration::from_secs(900));
    }
}
