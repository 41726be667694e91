//! # Retryflow
//!
//! Retry execution for asynchronous operations that report through
//! single-assignment deferred results.
//!
//! Retryflow provides:
//!
//! - **Deferred results**: settle-once values with continuations and `.await` support
//! - **Composition**: sequential and parallel combination of deferred results
//! - **Task runner**: blocking work and futures on a tokio runtime, reported as deferred results
//! - **Retry executor**: re-invokes a failing operation up to a configured limit
//! - **Event sinks**: structured lifecycle events for every retry cycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use retryflow::prelude::*;
//!
//! let runner = AsyncTaskRunner::current();
//! let executor = RetryExecutor::current(RetryConfig::new().with_max_retries(3));
//!
//! let result = executor.execute(move || runner.run(|| fetch_report()));
//! let report = result.await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod deferred;
pub mod errors;
pub mod events;
pub mod observability;
pub mod retry;
pub mod runner;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::deferred::{parallel, sequential, Deferred, DeferredState, Outcome};
    pub use crate::errors::{
        DoubleSettlementError, OperationError, RetriesExhaustedError, RetryflowError,
        TimeoutError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::retry::{Operation, RetryConfig, RetryExecutor};
    pub use crate::runner::AsyncTaskRunner;
}
