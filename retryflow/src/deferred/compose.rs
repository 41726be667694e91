//! Sequential and parallel composition of deferred results.

use super::{forward, Deferred, Outcome};
use crate::errors::{describe_panic, RetryflowError};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Runs `f` after `first` fulfills and forwards the deferred it returns.
///
/// If `first` fails, the result fails with the same error and `f` is never
/// called. A panic inside `f` fails the result with
/// [`RetryflowError::Panicked`].
pub fn sequential<X, Y, F>(first: &Deferred<X>, f: F) -> Deferred<Y>
where
    X: Clone + Send + 'static,
    Y: Clone + Send + 'static,
    F: FnOnce(X) -> Deferred<Y> + Send + 'static,
{
    let result = Deferred::new();
    let target = result.clone();

    first.on_settle(move |outcome| match outcome {
        Ok(value) => match catch_unwind(AssertUnwindSafe(move || f(value))) {
            Ok(second) => second.on_settle(move |outcome| forward(&target, outcome)),
            Err(payload) => forward(
                &target,
                Err(RetryflowError::Panicked(describe_panic(payload.as_ref()))),
            ),
        },
        Err(error) => forward(&target, Err(error)),
    });

    result
}

/// Joins two independent deferred results.
///
/// Settles only once both `a` and `b` have settled; neither member is
/// cancelled when the other fails. `combine` runs if and only if both
/// fulfill. When both fail, the error of `a` is reported.
pub fn parallel<X, Y, Z, F>(a: &Deferred<X>, b: &Deferred<Y>, combine: F) -> Deferred<Z>
where
    X: Clone + Send + 'static,
    Y: Clone + Send + 'static,
    Z: Clone + Send + 'static,
    F: FnOnce(X, Y) -> Z + Send + 'static,
{
    let result = Deferred::new();
    let join = Arc::new(Mutex::new(Join {
        left: None,
        right: None,
        combine: Some(combine),
    }));

    {
        let join = Arc::clone(&join);
        let target = result.clone();
        a.on_settle(move |outcome| {
            let ready = {
                let mut join = join.lock();
                join.left = Some(outcome);
                join.take_ready()
            };
            if let Some((left, right, combine)) = ready {
                forward(&target, resolve(left, right, combine));
            }
        });
    }

    {
        let target = result.clone();
        b.on_settle(move |outcome| {
            let ready = {
                let mut join = join.lock();
                join.right = Some(outcome);
                join.take_ready()
            };
            if let Some((left, right, combine)) = ready {
                forward(&target, resolve(left, right, combine));
            }
        });
    }

    result
}

struct Join<X, Y, F> {
    left: Option<Outcome<X>>,
    right: Option<Outcome<Y>>,
    combine: Option<F>,
}

impl<X, Y, F> Join<X, Y, F> {
    fn take_ready(&mut self) -> Option<(Outcome<X>, Outcome<Y>, F)> {
        if self.left.is_none() || self.right.is_none() {
            return None;
        }
        Some((self.left.take()?, self.right.take()?, self.combine.take()?))
    }
}

fn resolve<X, Y, Z, F>(left: Outcome<X>, right: Outcome<Y>, combine: F) -> Outcome<Z>
where
    F: FnOnce(X, Y) -> Z,
{
    match (left, right) {
        (Ok(x), Ok(y)) => catch_unwind(AssertUnwindSafe(move || combine(x, y)))
            .map_err(|payload| RetryflowError::Panicked(describe_panic(payload.as_ref()))),
        (Err(error), _) | (Ok(_), Err(error)) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OperationError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failure(message: &str) -> RetryflowError {
        OperationError::new(message).into()
    }

    #[test]
    fn test_sequential_forwards_second_stage() {
        let first = Deferred::new();
        let chained = sequential(&first, |x: i32| Deferred::fulfilled(x * 2));

        assert!(chained.is_pending());
        first.fulfill(21).unwrap();
        assert_eq!(chained.outcome().and_then(Result::ok), Some(42));
    }

    #[test]
    fn test_sequential_waits_for_pending_second_stage() {
        let first = Deferred::fulfilled(1);
        let second = Deferred::<String>::new();
        let handle = second.clone();

        let chained = sequential(&first, move |_| handle);
        assert!(chained.is_pending());

        second.fulfill("done".to_string()).unwrap();
        assert_eq!(chained.outcome().and_then(Result::ok), Some("done".to_string()));
    }

    #[test]
    fn test_sequential_short_circuits_on_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let first = Deferred::<i32>::failed(failure("first stage"));
        let chained = sequential(&first, move |x| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Deferred::fulfilled(x)
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let err = chained.outcome().and_then(Result::err);
        assert_eq!(err.map(|e| e.to_string()), Some("first stage".to_string()));
    }

    #[test]
    fn test_sequential_second_stage_failure() {
        let first = Deferred::fulfilled(1);
        let chained: Deferred<i32> = sequential(&first, |_| Deferred::failed(failure("second")));
        assert!(matches!(chained.outcome(), Some(Err(RetryflowError::Operation(_)))));
    }

    #[test]
    fn test_sequential_generator_panic() {
        let first = Deferred::fulfilled(1);
        let chained: Deferred<i32> = sequential(&first, |_| panic!("generator exploded"));
        assert!(matches!(
            chained.outcome(),
            Some(Err(RetryflowError::Panicked(m))) if m == "generator exploded"
        ));
    }

    #[test]
    fn test_parallel_combines_both_values() {
        let a = Deferred::<String>::new();
        let b = Deferred::<String>::new();
        let joined = parallel(&a, &b, |x, y| format!("{x} then {y}"));

        a.fulfill("Success".to_string()).unwrap();
        assert!(joined.is_pending());
        b.fulfill("Success".to_string()).unwrap();

        assert_eq!(
            joined.outcome().and_then(Result::ok),
            Some("Success then Success".to_string())
        );
    }

    #[test]
    fn test_parallel_waits_for_sibling_after_failure() {
        let combined = Arc::new(AtomicUsize::new(0));
        let combined_clone = Arc::clone(&combined);

        let a = Deferred::<i32>::new();
        let b = Deferred::<i32>::new();
        let joined = parallel(&a, &b, move |x, y| {
            combined_clone.fetch_add(1, Ordering::SeqCst);
            x + y
        });

        b.fail(failure("right failed")).unwrap();
        assert!(joined.is_pending());

        a.fulfill(1).unwrap();
        assert!(joined.is_settled());
        assert_eq!(combined.load(Ordering::SeqCst), 0);
        assert!(matches!(joined.outcome(), Some(Err(RetryflowError::Operation(_)))));
    }

    #[test]
    fn test_parallel_reports_left_error_when_both_fail() {
        let a = Deferred::<i32>::new();
        let b = Deferred::<i32>::new();
        let joined = parallel(&a, &b, |x, y| x + y);

        b.fail(failure("right")).unwrap();
        a.fail(failure("left")).unwrap();

        let err = joined.outcome().and_then(Result::err);
        assert_eq!(err.map(|e| e.to_string()), Some("left".to_string()));
    }

    #[test]
    fn test_parallel_combine_panic() {
        let a = Deferred::fulfilled(1);
        let b = Deferred::fulfilled(2);
        let joined: Deferred<i32> = parallel(&a, &b, |_, _| panic!("combine exploded"));
        assert!(matches!(joined.outcome(), Some(Err(RetryflowError::Panicked(_)))));
    }
}
