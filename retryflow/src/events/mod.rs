//! Retry lifecycle events.
//!
//! The retry executor reports attempt failures and terminal outcomes to an
//! [`EventSink`]. Payloads are JSON objects stamped with a UTC timestamp.

mod sink;

#[cfg(test)]
pub use sink::MockEventSink;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::Utc;

/// Emitted after a failed attempt that will be retried.
pub const ATTEMPT_FAILED: &str = "retry.attempt_failed";
/// Emitted when an attempt fulfills.
pub const SUCCEEDED: &str = "retry.succeeded";
/// Emitted when the retry budget is used up.
pub const EXHAUSTED: &str = "retry.exhausted";
/// Emitted when the cycle timeout expires first.
pub const TIMED_OUT: &str = "retry.timed_out";

/// Returns the current UTC time as an ISO 8601 string.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Adds a `timestamp` field to an event payload object.
#[must_use]
pub fn stamped(mut data: serde_json::Value) -> serde_json::Value {
    if let Some(map) = data.as_object_mut() {
        map.insert("timestamp".to_string(), serde_json::Value::String(iso_timestamp()));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamped_adds_timestamp() {
        let data = stamped(serde_json::json!({"attempt": 1}));
        assert_eq!(data["attempt"], 1);
        assert!(data["timestamp"].as_str().is_some_and(|t| t.ends_with("+00:00")));
    }

    #[test]
    fn test_stamped_leaves_non_objects() {
        assert_eq!(stamped(serde_json::json!(3)), serde_json::json!(3));
    }
}
