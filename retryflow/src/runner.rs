//! Async task runner.
//!
//! Executes units of work on tokio workers, off the caller's control path,
//! and reports each one through a [`Deferred`]. Errors and panics raised by
//! the work always end up in the deferred result's failure channel.

use crate::deferred::{Deferred, SettleGuard};
use crate::errors::{describe_panic, OperationError, RetryflowError};
use futures::FutureExt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::runtime::Handle;
use tokio::task::JoinError;

/// Runs work on a tokio runtime and hands back deferred results.
#[derive(Debug, Clone)]
pub struct AsyncTaskRunner {
    handle: Handle,
}

impl AsyncTaskRunner {
    /// Creates a runner on the given runtime.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a runner on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Creates a runner on the current runtime, if there is one.
    pub fn try_current() -> Result<Self, RetryflowError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| RetryflowError::Internal(e.to_string()))
    }

    /// Returns the runtime handle.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs a blocking closure on the runtime's blocking pool.
    ///
    /// Returns immediately with a pending deferred result that settles with
    /// the closure's return value or error.
    pub fn run<T, E, F>(&self, work: F) -> Deferred<T>
    where
        T: Clone + Send + 'static,
        E: Into<OperationError> + Send + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let deferred = Deferred::new();
        let guard = SettleGuard::new(deferred.clone());
        let blocking = self.handle.spawn_blocking(work);

        self.handle.spawn(async move {
            let outcome = match blocking.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(RetryflowError::Operation(error.into())),
                Err(join_error) => Err(from_join_error(join_error)),
            };
            guard.settle(outcome);
        });

        deferred
    }

    /// Spawns a future on an async worker.
    pub fn spawn<T, E, Fut>(&self, future: Fut) -> Deferred<T>
    where
        T: Clone + Send + 'static,
        E: Into<OperationError> + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let deferred = Deferred::new();
        let guard = SettleGuard::new(deferred.clone());

        self.handle.spawn(async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(RetryflowError::Operation(error.into())),
                Err(payload) => Err(RetryflowError::Panicked(describe_panic(payload.as_ref()))),
            };
            guard.settle(outcome);
        });

        deferred
    }

    /// Runs a deferred-producing call on a worker and forwards its result.
    ///
    /// Used to move a whole call, such as a retry cycle, off the caller's
    /// control path.
    pub fn dispatch<T, F>(&self, call: F) -> Deferred<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Deferred<T> + Send + 'static,
    {
        let deferred = Deferred::new();
        let guard = SettleGuard::new(deferred.clone());

        self.handle.spawn(async move {
            match catch_unwind(AssertUnwindSafe(call)) {
                Ok(inner) => inner.on_settle(move |outcome| guard.settle(outcome)),
                Err(payload) => guard.settle(Err(RetryflowError::Panicked(describe_panic(
                    payload.as_ref(),
                )))),
            }
        });

        deferred
    }
}

fn from_join_error(error: JoinError) -> RetryflowError {
    if error.is_panic() {
        RetryflowError::Panicked(describe_panic(error.into_panic().as_ref()))
    } else {
        RetryflowError::Abandoned
    }
}
