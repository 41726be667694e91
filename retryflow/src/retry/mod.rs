//! Retrying asynchronous operations.
//!
//! This module provides:
//! - Retry configuration and per-cycle attempt bookkeeping
//! - The `Operation` trait accepted by the executor
//! - The `RetryExecutor` state machine

mod config;
mod executor;
mod operation;

pub use config::{RetryAttempt, RetryConfig, RetryDecision, RetryPhase};
pub use executor::RetryExecutor;
pub use operation::{IntoDeferred, Operation};
