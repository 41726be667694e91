//! Single-assignment deferred results.
//!
//! A [`Deferred`] settles exactly once, either fulfilled with a value or
//! failed with a [`RetryflowError`]. Continuations registered with
//! [`Deferred::on_settle`] run once, after settlement, with the final
//! outcome.
//!
//! This module provides:
//! - The `Deferred` handle and its state snapshot
//! - Sequential and parallel composition (`sequential`, `parallel`)

mod compose;
#[cfg(test)]
mod deferred_tests;

pub use compose::{parallel, sequential};

use crate::errors::{describe_panic, DoubleSettlementError, RetryflowError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The outcome a deferred result settles with.
pub type Outcome<T> = Result<T, RetryflowError>;

type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

/// Observable state of a deferred result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredState {
    /// Not yet settled.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with an error.
    Failed,
}

impl DeferredState {
    /// Returns the state as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeferredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Slot<T> {
    Pending(Vec<Continuation<T>>),
    Fulfilled(T),
    Failed(RetryflowError),
}

impl<T> Slot<T> {
    fn state(&self) -> DeferredState {
        match self {
            Self::Pending(_) => DeferredState::Pending,
            Self::Fulfilled(_) => DeferredState::Fulfilled,
            Self::Failed(_) => DeferredState::Failed,
        }
    }
}

/// A value that becomes available later.
///
/// Cloning a `Deferred` yields another handle to the same slot. Settling is
/// one-shot: the first `fulfill`/`fail` wins and every later attempt returns
/// [`DoubleSettlementError`] without touching the stored outcome.
///
/// Continuations registered on an already-settled deferred run synchronously
/// on the registering thread; otherwise they run on the thread that settles
/// it, outside the internal lock.
pub struct Deferred<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Deferred<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a new pending deferred result.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Pending(Vec::new()))),
        }
    }

    /// Creates a deferred result already fulfilled with `value`.
    #[must_use]
    pub fn fulfilled(value: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Fulfilled(value))),
        }
    }

    /// Creates a deferred result already failed with `error`.
    #[must_use]
    pub fn failed(error: impl Into<RetryflowError>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Failed(error.into()))),
        }
    }

    /// Creates a deferred result settled with `outcome`.
    #[must_use]
    pub fn from_outcome(outcome: Outcome<T>) -> Self {
        match outcome {
            Ok(value) => Self::fulfilled(value),
            Err(error) => Self::failed(error),
        }
    }

    /// Fulfills the deferred result with a value.
    pub fn fulfill(&self, value: T) -> Result<(), DoubleSettlementError> {
        self.settle(Ok(value))
    }

    /// Fails the deferred result with an error.
    pub fn fail(&self, error: impl Into<RetryflowError>) -> Result<(), DoubleSettlementError> {
        self.settle(Err(error.into()))
    }

    /// Settles the deferred result and runs every queued continuation.
    ///
    /// Returns an error, leaving the stored outcome untouched, if the
    /// deferred result was already settled.
    pub fn settle(&self, outcome: Outcome<T>) -> Result<(), DoubleSettlementError> {
        let waiting = {
            let mut slot = self.slot.lock();
            let waiting = match &mut *slot {
                Slot::Pending(waiting) => std::mem::take(waiting),
                settled => return Err(DoubleSettlementError::new(settled.state())),
            };
            *slot = match &outcome {
                Ok(value) => Slot::Fulfilled(value.clone()),
                Err(error) => Slot::Failed(error.clone()),
            };
            waiting
        };

        for continuation in waiting {
            dispatch(continuation, outcome.clone());
        }
        Ok(())
    }

    /// Registers a continuation to run once the deferred result settles.
    ///
    /// If already settled, the continuation runs immediately on the calling
    /// thread. Panics inside the continuation are logged and suppressed.
    pub fn on_settle<F>(&self, continuation: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        let outcome = {
            let mut slot = self.slot.lock();
            match &mut *slot {
                Slot::Pending(waiting) => {
                    waiting.push(Box::new(continuation));
                    return;
                }
                Slot::Fulfilled(value) => Ok(value.clone()),
                Slot::Failed(error) => Err(error.clone()),
            }
        };

        dispatch(Box::new(continuation), outcome);
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> DeferredState {
        self.slot.lock().state()
    }

    /// Returns true if not yet settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == DeferredState::Pending
    }

    /// Returns true if fulfilled or failed.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Returns a snapshot of the outcome, or `None` while pending.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome<T>> {
        match &*self.slot.lock() {
            Slot::Pending(_) => None,
            Slot::Fulfilled(value) => Some(Ok(value.clone())),
            Slot::Failed(error) => Some(Err(error.clone())),
        }
    }

    /// Waits for the deferred result to settle.
    ///
    /// Resolves to [`RetryflowError::Abandoned`] if the continuation is
    /// dropped without ever running.
    pub async fn wait(&self) -> Outcome<T> {
        let (tx, rx) = oneshot::channel();
        self.on_settle(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or(Err(RetryflowError::Abandoned))
    }

    /// Maps a fulfilled value, forwarding failures unchanged.
    #[must_use]
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        sequential(self, move |value| Deferred::fulfilled(f(value)))
    }

    /// Chains a dependent deferred step after this one fulfills.
    ///
    /// See [`sequential`].
    #[must_use]
    pub fn and_then<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Deferred<U> + Send + 'static,
    {
        sequential(self, f)
    }

    /// Joins this deferred result with an independent one.
    ///
    /// See [`parallel`].
    #[must_use]
    pub fn combine<U, Z, F>(&self, other: &Deferred<U>, f: F) -> Deferred<Z>
    where
        U: Clone + Send + 'static,
        Z: Clone + Send + 'static,
        F: FnOnce(T, U) -> Z + Send + 'static,
    {
        parallel(self, other, f)
    }
}

impl<T> Default for Deferred<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntoFuture for Deferred<T>
where
    T: Clone + Send + 'static,
{
    type Output = Outcome<T>;
    type IntoFuture = BoxFuture<'static, Outcome<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.slot.lock().state())
            .finish()
    }
}

fn dispatch<T>(continuation: Continuation<T>, outcome: Outcome<T>) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        continuation(outcome);
    })) {
        warn!(
            panic = %describe_panic(payload.as_ref()),
            "Deferred continuation panicked"
        );
    }
}

/// Settles `target` with `outcome`, logging if it was already settled.
pub(crate) fn forward<T>(target: &Deferred<T>, outcome: Outcome<T>)
where
    T: Clone + Send + 'static,
{
    if let Err(e) = target.settle(outcome) {
        debug!(error = %e, "Discarding outcome for settled deferred");
    }
}

/// Owns the right to settle a deferred result from a worker task.
///
/// Dropping the guard without settling fails the target with
/// [`RetryflowError::Abandoned`], so a cancelled task never leaves its
/// result pending forever.
pub(crate) struct SettleGuard<T>
where
    T: Clone + Send + 'static,
{
    target: Option<Deferred<T>>,
}

impl<T> SettleGuard<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new(target: Deferred<T>) -> Self {
        Self {
            target: Some(target),
        }
    }

    pub(crate) fn settle(mut self, outcome: Outcome<T>) {
        if let Some(target) = self.target.take() {
            forward(&target, outcome);
        }
    }
}

impl<T> Drop for SettleGuard<T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            if target.fail(RetryflowError::Abandoned).is_ok() {
                warn!("Worker task dropped before settling its deferred result");
            }
        }
    }
}
