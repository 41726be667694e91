//! The retry executor.
//!
//! A retry cycle invokes an [`Operation`], waits for its deferred result to
//! settle and either forwards the value to the caller or invokes the
//! operation again. Intermediate failures never reach the caller's
//! deferred result; it settles exactly once.

use super::config::{RetryAttempt, RetryConfig, RetryDecision, RetryPhase};
use super::operation::Operation;
use crate::deferred::{Deferred, Outcome};
use crate::errors::{
    describe_panic, OperationError, RetriesExhaustedError, RetryflowError, TimeoutError,
};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::runner::AsyncTaskRunner;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Re-invokes failing asynchronous operations up to a bounded retry count.
///
/// The executor never blocks. The first attempt starts on the calling
/// thread; every retry is scheduled on the runtime, so attempts carry no
/// thread affinity. Attempt N+1 starts only after attempt N's deferred
/// result has settled.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    handle: Handle,
    sink: Arc<dyn EventSink>,
}

impl RetryExecutor {
    /// Creates an executor scheduling retries on the given runtime.
    #[must_use]
    pub fn new(config: RetryConfig, handle: Handle) -> Self {
        Self {
            config,
            handle,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Creates an executor on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn current(config: RetryConfig) -> Self {
        Self::new(config, Handle::current())
    }

    /// Sets the sink receiving retry events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the retry configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds or the retry budget is used up.
    ///
    /// The returned deferred result fulfills with the first successful
    /// value, or fails with [`RetriesExhaustedError`] carrying the last
    /// failure after `max_retries + 1` failed invocations. With a timeout
    /// configured it may instead fail with [`TimeoutError`]; in-flight work
    /// is then abandoned and no further attempts start.
    pub fn execute<T, O>(&self, operation: O) -> Deferred<T>
    where
        T: Clone + Send + 'static,
        O: Operation<T> + 'static,
    {
        let caller = Deferred::new();
        let cycle = Arc::new(RetryCycle {
            id: Uuid::new_v4(),
            operation,
            caller: caller.clone(),
            attempt: Mutex::new(RetryAttempt::new(self.config.max_retries)),
            concluded: AtomicBool::new(false),
            handle: self.handle.clone(),
            sink: Arc::clone(&self.sink),
        });

        debug!(
            cycle_id = %cycle.id,
            max_retries = self.config.max_retries,
            "Starting retry cycle"
        );

        if let Some(timeout) = self.config.timeout() {
            let timeout_ms = self.config.timeout_ms.unwrap_or_default();
            let timed = Arc::clone(&cycle);

            let timer = self.handle.spawn(async move {
                tokio::time::sleep(timeout).await;
                timed.time_out(timeout_ms).await;
            });
            caller.on_settle(move |_| timer.abort());
        }

        cycle.invoke();
        caller
    }

    /// Runs an async closure with retries.
    ///
    /// Each attempt calls `f` and runs the returned future on a runtime
    /// worker.
    pub fn execute_async<T, E, F, Fut>(&self, f: F) -> Deferred<T>
    where
        T: Clone + Send + 'static,
        E: Into<OperationError> + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let runner = AsyncTaskRunner::new(self.handle.clone());
        self.execute(move || runner.spawn(f()))
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// State shared by the continuations of one retry cycle.
struct RetryCycle<T, O>
where
    T: Clone + Send + 'static,
{
    id: Uuid,
    operation: O,
    caller: Deferred<T>,
    attempt: Mutex<RetryAttempt>,
    /// Set by whichever of success, exhaustion, timeout or drop ends the
    /// cycle first. Only that path emits a terminal event and settles the
    /// caller.
    concluded: AtomicBool,
    handle: Handle,
    sink: Arc<dyn EventSink>,
}

impl<T, O> RetryCycle<T, O>
where
    T: Clone + Send + 'static,
    O: Operation<T> + 'static,
{
    fn invoke(self: Arc<Self>) {
        if self.concluded.load(Ordering::Acquire) {
            debug!(cycle_id = %self.id, "Cycle already concluded, skipping attempt");
            return;
        }

        let invocation = self.attempt.lock().next_invocation();
        trace!(
            cycle_id = %self.id,
            attempt = invocation,
            phase = %RetryPhase::Invoking,
            "Invoking operation"
        );

        // A synchronous panic counts as an immediately-failed attempt.
        let pending = catch_unwind(AssertUnwindSafe(|| self.operation.invoke()))
            .unwrap_or_else(|payload| {
                Deferred::failed(RetryflowError::Panicked(describe_panic(payload.as_ref())))
            });

        trace!(
            cycle_id = %self.id,
            attempt = invocation,
            phase = %RetryPhase::Awaiting,
            "Awaiting operation result"
        );
        pending.on_settle(move |outcome| self.on_settled(invocation, outcome));
    }

    fn on_settled(self: Arc<Self>, invocation: u64, outcome: Outcome<T>) {
        let error = match outcome {
            Ok(value) => {
                debug!(
                    cycle_id = %self.id,
                    attempt = invocation,
                    phase = %RetryPhase::Succeeded,
                    "Operation succeeded"
                );
                if self.conclude() {
                    self.emit(events::SUCCEEDED, invocation, None);
                    self.publish(Ok(value));
                }
                return;
            }
            Err(error) => error,
        };

        let (decision, failures, max_retries) = {
            let mut attempt = self.attempt.lock();
            let decision = attempt.record_failure(error.clone());
            (decision, attempt.attempt_number, attempt.max_retries)
        };

        match decision {
            RetryDecision::Retry => {
                debug!(
                    cycle_id = %self.id,
                    attempt = invocation,
                    max_retries,
                    error = %error,
                    phase = %RetryPhase::RetryPending,
                    "Attempt failed, retrying"
                );
                self.emit(events::ATTEMPT_FAILED, invocation, Some(&error));

                let handle = self.handle.clone();
                handle.spawn(async move { self.invoke() });
            }
            RetryDecision::GiveUp => {
                warn!(
                    cycle_id = %self.id,
                    attempts = failures,
                    max_retries,
                    error = %error,
                    phase = %RetryPhase::Exhausted,
                    "Retries exhausted"
                );
                if self.conclude() {
                    self.emit(events::EXHAUSTED, invocation, Some(&error));
                    let exhausted = RetriesExhaustedError::new(failures, max_retries, error);
                    self.publish(Err(exhausted.into()));
                }
            }
        }
    }

    /// Claims the right to end the cycle. Returns false if another path
    /// already did.
    fn conclude(&self) -> bool {
        !self.concluded.swap(true, Ordering::AcqRel)
    }

    async fn time_out(&self, timeout_ms: u64) {
        if !self.conclude() {
            return;
        }
        warn!(
            cycle_id = %self.id,
            timeout_ms,
            phase = %RetryPhase::TimedOut,
            "Retry cycle timed out"
        );
        let data = events::stamped(serde_json::json!({
            "cycle_id": self.id.to_string(),
            "timeout_ms": timeout_ms,
        }));
        self.sink.emit(events::TIMED_OUT, Some(data)).await;
        self.publish(Err(TimeoutError { timeout_ms }.into()));
    }

    /// Settles the caller. Events are emitted first so that anyone awaiting
    /// the caller observes them.
    fn publish(&self, outcome: Outcome<T>) {
        if let Err(e) = self.caller.settle(outcome) {
            debug!(cycle_id = %self.id, error = %e, "Discarding outcome of finished cycle");
        }
    }

    fn emit(&self, event_type: &str, attempt: u64, error: Option<&RetryflowError>) {
        let mut data = serde_json::json!({
            "cycle_id": self.id.to_string(),
            "attempt": attempt,
            "max_retries": self.attempt.lock().max_retries,
        });
        if let (Some(error), Some(map)) = (error, data.as_object_mut()) {
            map.insert("error".to_string(), serde_json::Value::String(error.to_string()));
        }
        self.sink.try_emit(event_type, Some(events::stamped(data)));
    }
}

impl<T, O> Drop for RetryCycle<T, O>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        let first = !self.concluded.swap(true, Ordering::AcqRel);
        if first && self.caller.fail(RetryflowError::Abandoned).is_ok() {
            warn!(cycle_id = %self.id, "Retry cycle dropped before settling its caller");
        }
    }
}
