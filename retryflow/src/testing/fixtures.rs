//! Scenario operations with observable invocation counts.
//!
//! Each operation owns an explicit [`InvocationCounter`] instead of sharing
//! client-wide mutable state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::deferred::Deferred;
use crate::errors::OperationError;
use crate::runner::AsyncTaskRunner;

/// Error message produced by simulated failures.
pub const SIMULATED_ERROR: &str = "Simulated error";

/// Value produced by successful simulated tasks.
pub const SUCCESS: &str = "Success";

/// Simulated processing time of one task.
pub const TASK_LATENCY: Duration = Duration::from_millis(50);

/// A thread-safe invocation counter.
#[derive(Debug, Clone, Default)]
pub struct InvocationCounter {
    count: Arc<AtomicUsize>,
}

impl InvocationCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter and returns the new count.
    pub fn increment(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the current count.
    #[must_use]
    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Which invocations of a scenario operation fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePlan {
    /// Every invocation fails.
    Always,
    /// Invocations `1..=n` fail, later ones succeed.
    FirstN(usize),
    /// No invocation fails.
    Never,
}

impl FailurePlan {
    /// Returns true if the given 1-based invocation should fail.
    #[must_use]
    pub fn fails_on(self, invocation: usize) -> bool {
        match self {
            Self::Always => true,
            Self::FirstN(n) => invocation <= n,
            Self::Never => false,
        }
    }

    fn error_for(self, invocation: usize) -> Option<&'static str> {
        self.fails_on(invocation).then_some(SIMULATED_ERROR)
    }
}

/// Returns a blocking task that sleeps for [`TASK_LATENCY`], then fails with
/// `error` or returns [`SUCCESS`].
pub fn simulated_task(
    error: Option<&'static str>,
) -> impl FnOnce() -> Result<String, OperationError> + Send + 'static {
    move || {
        std::thread::sleep(TASK_LATENCY);
        match error {
            Some(message) => Err(OperationError::new(message)),
            None => Ok(SUCCESS.to_string()),
        }
    }
}

/// Builds the operations exercised by the retry scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioClient {
    runner: AsyncTaskRunner,
}

impl ScenarioClient {
    /// Creates a client running tasks on `runner`.
    #[must_use]
    pub fn new(runner: AsyncTaskRunner) -> Self {
        Self { runner }
    }

    /// Returns the runner used for simulated tasks.
    #[must_use]
    pub fn runner(&self) -> &AsyncTaskRunner {
        &self.runner
    }

    /// An operation returning an already-settled deferred result.
    pub fn settled(
        &self,
        counter: InvocationCounter,
        plan: FailurePlan,
    ) -> impl Fn() -> Deferred<String> + Send + Sync + 'static {
        move || {
            let invocation = counter.increment();
            match plan.error_for(invocation) {
                Some(message) => Deferred::failed(OperationError::from(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    message,
                ))),
                None => Deferred::fulfilled(SUCCESS.to_string()),
            }
        }
    }

    /// An operation that fails a deferred result owned by the caller and
    /// returns it.
    ///
    /// From the second invocation on the shared result is already failed,
    /// so every retry observes the same failure.
    pub fn fail_shared(
        &self,
        counter: InvocationCounter,
        shared: Deferred<String>,
    ) -> impl Fn() -> Deferred<String> + Send + Sync + 'static {
        move || {
            counter.increment();
            // Ignored: only the first call can settle the shared result.
            let _ = shared.fail(OperationError::new(SIMULATED_ERROR));
            shared.clone()
        }
    }

    /// An operation chaining two simulated tasks; the second one fails
    /// according to `plan`.
    pub fn sequential(
        &self,
        counter: InvocationCounter,
        plan: FailurePlan,
    ) -> impl Fn() -> Deferred<String> + Send + Sync + 'static {
        let runner = self.runner.clone();
        move || {
            let error = plan.error_for(counter.increment());
            let second = runner.clone();
            runner
                .run(simulated_task(None))
                .and_then(move |_| second.run(simulated_task(error)))
        }
    }

    /// An operation joining two simulated tasks run in parallel; the right
    /// one fails according to `plan`.
    ///
    /// `members` counts completed member tasks and `combines` counts calls
    /// of the combining function.
    pub fn parallel(
        &self,
        counter: InvocationCounter,
        plan: FailurePlan,
        members: InvocationCounter,
        combines: InvocationCounter,
    ) -> impl Fn() -> Deferred<String> + Send + Sync + 'static {
        let runner = self.runner.clone();
        move || {
            let error = plan.error_for(counter.increment());
            let left = runner.run(counted(members.clone(), simulated_task(None)));
            let right = runner.run(counted(members.clone(), simulated_task(error)));

            let combines = combines.clone();
            left.combine(&right, move |a, b| {
                combines.increment();
                format!("{a} then {b}")
            })
        }
    }
}

fn counted<T, F>(
    counter: InvocationCounter,
    task: F,
) -> impl FnOnce() -> Result<T, OperationError> + Send + 'static
where
    F: FnOnce() -> Result<T, OperationError> + Send + 'static,
{
    move || {
        let result = task();
        counter.increment();
        result
    }
}
