//! Test assertions for deferred results.

use crate::deferred::{Deferred, DeferredState};
use crate::errors::RetryflowError;
use std::fmt::Debug;

/// Asserts that the deferred result is still pending.
pub fn assert_pending<T>(deferred: &Deferred<T>)
where
    T: Clone + Send + 'static,
{
    assert_eq!(
        deferred.state(),
        DeferredState::Pending,
        "Expected pending, got {}",
        deferred.state()
    );
}

/// Asserts that the deferred result fulfilled with `expected`.
pub fn assert_fulfilled_with<T>(deferred: &Deferred<T>, expected: &T)
where
    T: Clone + Send + Debug + PartialEq + 'static,
{
    match deferred.outcome() {
        Some(Ok(actual)) => assert_eq!(
            &actual, expected,
            "Expected value {expected:?}, got {actual:?}"
        ),
        Some(Err(error)) => panic!("Expected value {expected:?}, got failure: {error}"),
        None => panic!("Expected value {expected:?}, but the deferred result is pending"),
    }
}

/// Asserts that the deferred result failed and returns the error.
pub fn assert_failed<T>(deferred: &Deferred<T>) -> RetryflowError
where
    T: Clone + Send + Debug + 'static,
{
    match deferred.outcome() {
        Some(Err(error)) => error,
        Some(Ok(value)) => panic!("Expected failure, got value {value:?}"),
        None => panic!("Expected failure, but the deferred result is pending"),
    }
}

/// Asserts that the deferred result failed with retries exhausted after
/// `attempts` failed invocations.
pub fn assert_exhausted_after<T>(deferred: &Deferred<T>, attempts: u64)
where
    T: Clone + Send + Debug + 'static,
{
    match assert_failed(deferred) {
        RetryflowError::RetriesExhausted(e) => assert_eq!(
            e.attempts, attempts,
            "Expected exhaustion after {attempts} attempts, got {}",
            e.attempts
        ),
        other => panic!("Expected retries exhausted, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{OperationError, RetriesExhaustedError};

    #[test]
    fn test_assert_fulfilled_with() {
        assert_fulfilled_with(&Deferred::fulfilled(3), &3);
    }

    #[test]
    #[should_panic(expected = "pending")]
    fn test_assert_fulfilled_with_pending_panics() {
        assert_fulfilled_with(&Deferred::<i32>::new(), &3);
    }

    #[test]
    fn test_assert_failed_returns_error() {
        let deferred = Deferred::<i32>::failed(OperationError::new("Simulated error"));
        assert_eq!(assert_failed(&deferred).to_string(), "Simulated error");
    }

    #[test]
    fn test_assert_exhausted_after() {
        let last = OperationError::new("Simulated error").into();
        let deferred = Deferred::<i32>::failed(RetriesExhaustedError::new(3, 2, last));
        assert_exhausted_after(&deferred, 3);
    }

    #[test]
    #[should_panic(expected = "Expected retries exhausted")]
    fn test_assert_exhausted_after_wrong_error() {
        let deferred = Deferred::<i32>::failed(OperationError::new("Simulated error"));
        assert_exhausted_after(&deferred, 3);
    }

    #[test]
    fn test_assert_pending() {
        assert_pending(&Deferred::<i32>::new());
    }
}
