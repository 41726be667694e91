//! Retry configuration and attempt bookkeeping.

use crate::errors::RetryflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retries after the initial invocation.
    pub max_retries: u32,
    /// Deadline for the whole retry cycle in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_ms: None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the cycle timeout, rounded up to whole milliseconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_micros().div_ceil(1000);
        self.timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    /// Returns the cycle timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Phase of a retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPhase {
    /// Calling the operation.
    Invoking,
    /// Waiting for the operation's deferred result.
    Awaiting,
    /// The last attempt failed and another one is scheduled.
    RetryPending,
    /// An attempt fulfilled.
    Succeeded,
    /// The retry budget is used up.
    Exhausted,
    /// The cycle timeout expired first.
    TimedOut,
}

impl RetryPhase {
    /// Returns the phase as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoking => "invoking",
            Self::Awaiting => "awaiting",
            Self::RetryPending => "retry_pending",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for RetryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Invoke the operation again.
    Retry,
    /// No more retries, give up.
    GiveUp,
}

/// Bookkeeping for one retry cycle.
///
/// `attempt_number` counts failed invocations; the cycle gives up once it
/// exceeds `max_retries`.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// Number of failed invocations so far.
    pub attempt_number: u64,
    /// The configured retry budget.
    pub max_retries: u32,
    /// The most recent failure.
    pub last_error: Option<RetryflowError>,
}

impl RetryAttempt {
    /// Creates the record for a new cycle.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempt_number: 0,
            max_retries,
            last_error: None,
        }
    }

    /// Records a failed attempt and decides whether to retry.
    pub fn record_failure(&mut self, error: RetryflowError) -> RetryDecision {
        self.attempt_number += 1;
        self.last_error = Some(error);

        if self.is_exhausted() {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry
        }
    }

    /// Returns true once failures exceed the retry budget.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt_number > u64::from(self.max_retries)
    }

    /// Returns the 1-based number of the invocation about to run.
    #[must_use]
    pub fn next_invocation(&self) -> u64 {
        self.attempt_number + 1
    }
}
