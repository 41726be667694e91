//! Error types for the retryflow crate.
//!
//! Every failure travels through a [`Deferred`](crate::deferred::Deferred)'s
//! failure channel, so all error types here are cheap to clone: one settled
//! failure may be observed by several continuations.

use crate::deferred::DeferredState;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for retryflow operations.
#[derive(Debug, Clone, Error)]
pub enum RetryflowError {
    /// The wrapped operation failed.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// The retry executor gave up after exhausting its retry budget.
    #[error(transparent)]
    RetriesExhausted(#[from] RetriesExhaustedError),

    /// A deferred result was settled twice.
    #[error(transparent)]
    DoubleSettlement(#[from] DoubleSettlementError),

    /// A retry cycle did not finish before its deadline.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// A unit of work panicked.
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// Everything able to settle a pending deferred result was dropped.
    #[error("Deferred result abandoned before settlement")]
    Abandoned,

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RetryflowError {
    /// Returns true if this is a retries-exhausted failure.
    #[must_use]
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted(_))
    }

    /// Returns true if this is a timeout failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns the innermost error, unwrapping retries-exhausted layers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::RetriesExhausted(e) => e.last_error().root_cause(),
            other => other,
        }
    }
}

/// Error raised by a wrapped operation.
///
/// Carries a message and, optionally, the original cause.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct OperationError {
    /// The error message.
    pub message: String,
    /// The original cause, if any.
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl OperationError {
    /// Creates an operation error with a message and no cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an operation error wrapping an original cause.
    #[must_use]
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Returns the original cause, if any.
    #[must_use]
    pub fn original_cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl From<std::io::Error> for OperationError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        let message = err.to_string();
        let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
        Self {
            message,
            source: Some(Arc::from(boxed)),
        }
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Error raised when a retry cycle fails more than `max_retries` times.
#[derive(Debug, Clone, Error)]
#[error("Retries exhausted after {attempts} attempts (max_retries = {max_retries}): {last_error}")]
pub struct RetriesExhaustedError {
    /// Number of failed invocations.
    pub attempts: u64,
    /// The configured retry budget.
    pub max_retries: u32,
    /// The failure of the final attempt.
    #[source]
    last_error: Box<RetryflowError>,
}

impl RetriesExhaustedError {
    /// Creates a new retries-exhausted error.
    #[must_use]
    pub fn new(attempts: u64, max_retries: u32, last_error: RetryflowError) -> Self {
        Self {
            attempts,
            max_retries,
            last_error: Box::new(last_error),
        }
    }

    /// Returns the failure of the final attempt.
    #[must_use]
    pub fn last_error(&self) -> &RetryflowError {
        &self.last_error
    }
}

/// Error returned when settling an already-settled deferred result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Deferred result already settled as {state}")]
pub struct DoubleSettlementError {
    /// The state the deferred result had already reached.
    pub state: DeferredState,
}

impl DoubleSettlementError {
    /// Creates a new double settlement error.
    #[must_use]
    pub fn new(state: DeferredState) -> Self {
        Self { state }
    }
}

/// Error raised when a retry cycle exceeds its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Timed out after {timeout_ms}ms")]
pub struct TimeoutError {
    /// The timeout that expired, in milliseconds.
    pub timeout_ms: u64,
}

/// Extracts a readable message from a panic payload.
pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
