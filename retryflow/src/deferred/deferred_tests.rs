//! Tests for the Deferred settle-once contract.

#[cfg(test)]
mod tests {
    use crate::deferred::{Deferred, DeferredState, SettleGuard};
    use crate::errors::{OperationError, RetryflowError};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    #[test]
    fn test_new_is_pending() {
        let deferred = Deferred::<i32>::new();
        assert_eq!(deferred.state(), DeferredState::Pending);
        assert!(deferred.is_pending());
        assert!(deferred.outcome().is_none());
    }

    #[test]
    fn test_fulfill_transitions_once() {
        let deferred = Deferred::new();
        deferred.fulfill(1).unwrap();

        assert_eq!(deferred.state(), DeferredState::Fulfilled);
        let err = deferred.fulfill(2).unwrap_err();
        assert_eq!(err.state, DeferredState::Fulfilled);

        // first value wins
        assert_eq!(deferred.outcome().and_then(Result::ok), Some(1));
    }

    #[test]
    fn test_fail_after_fulfill_is_rejected() {
        let deferred = Deferred::new();
        deferred.fulfill("Success".to_string()).unwrap();

        let err = deferred.fail(OperationError::new("late")).unwrap_err();
        assert_eq!(err.state, DeferredState::Fulfilled);
        assert!(matches!(deferred.outcome(), Some(Ok(ref v)) if v == "Success"));
    }

    #[test]
    fn test_fulfill_after_fail_is_rejected() {
        let deferred = Deferred::<i32>::failed(OperationError::new("Simulated error"));
        let err = deferred.fulfill(3).unwrap_err();
        assert_eq!(err.state, DeferredState::Failed);
        assert!(deferred.is_settled());
    }

    #[test]
    fn test_continuation_before_settlement_runs_once() {
        let deferred = Deferred::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        deferred.on_settle(move |outcome: Result<i32, RetryflowError>| {
            assert_eq!(outcome.ok(), Some(7));
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        deferred.fulfill(7).unwrap();
        deferred.fulfill(8).unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_continuation_after_settlement_runs_immediately() {
        let deferred = Deferred::<i32>::failed(OperationError::new("Simulated error"));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        deferred.on_settle(move |outcome| {
            assert!(outcome.is_err());
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_continuations_run_in_registration_order() {
        let deferred = Deferred::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            deferred.on_settle(move |_: Result<(), RetryflowError>| order.lock().push(i));
        }
        deferred.fulfill(()).unwrap();

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_continuation_is_suppressed() {
        let deferred = Deferred::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        deferred.on_settle(|_: Result<i32, RetryflowError>| panic!("Intentional panic"));
        deferred.on_settle(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        deferred.fulfill(1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_one_slot() {
        let deferred = Deferred::new();
        let other = deferred.clone();

        other.fulfill(5).unwrap();
        assert_eq!(deferred.outcome().and_then(Result::ok), Some(5));
        assert!(deferred.fulfill(6).is_err());
    }

    #[test]
    fn test_wait_resolves_after_settlement() {
        let deferred = Deferred::new();
        let mut waiting = tokio_test::task::spawn(deferred.wait());

        assert_pending!(waiting.poll());
        deferred.fulfill(42).unwrap();

        assert!(waiting.is_woken());
        let outcome = assert_ready!(waiting.poll());
        assert_eq!(outcome.ok(), Some(42));
    }

    #[test]
    fn test_wait_on_failed_deferred() {
        let deferred = Deferred::<i32>::failed(OperationError::new("Simulated error"));
        let outcome = tokio_test::block_on(deferred.wait());
        assert_eq!(outcome.unwrap_err().to_string(), "Simulated error");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_await_settled_from_another_thread() {
        let deferred = Deferred::new();
        let settler = deferred.clone();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            settler.fulfill("Success".to_string()).unwrap();
        });

        let value = deferred.await.unwrap();
        assert_eq!(value, "Success");
    }

    #[test]
    fn test_dropped_guard_abandons_deferred() {
        let deferred = Deferred::<i32>::new();
        drop(SettleGuard::new(deferred.clone()));

        assert!(matches!(deferred.outcome(), Some(Err(RetryflowError::Abandoned))));
    }

    #[test]
    fn test_guard_settles_once() {
        let deferred = Deferred::new();
        SettleGuard::new(deferred.clone()).settle(Ok(9));

        assert_eq!(deferred.outcome().and_then(Result::ok), Some(9));
    }

    #[test]
    fn test_map_transforms_value() {
        let deferred = Deferred::fulfilled(20);
        let mapped = deferred.map(|v| v + 1);
        assert_eq!(mapped.outcome().and_then(Result::ok), Some(21));
    }

    #[test]
    fn test_and_then_and_combine_methods() {
        let a = Deferred::fulfilled("Success".to_string());
        let b = Deferred::fulfilled("Success".to_string());

        let chained = a.and_then(|s| Deferred::fulfilled(s.len()));
        let joined = a.combine(&b, |x, y| format!("{x} then {y}"));

        assert_eq!(chained.outcome().and_then(Result::ok), Some(7));
        assert_eq!(
            joined.outcome().and_then(Result::ok),
            Some("Success then Success".to_string())
        );
    }

    #[test]
    fn test_from_outcome() {
        let ok = Deferred::from_outcome(Ok(1));
        let err = Deferred::<i32>::from_outcome(Err(RetryflowError::Internal("x".into())));

        assert_eq!(ok.state(), DeferredState::Fulfilled);
        assert_eq!(err.state(), DeferredState::Failed);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&DeferredState::Fulfilled).unwrap();
        assert_eq!(json, "\"fulfilled\"");
        assert_eq!(DeferredState::Pending.to_string(), "pending");
    }

    #[test]
    fn test_debug_shows_state() {
        let deferred = Deferred::<i32>::new();
        assert_eq!(format!("{deferred:?}"), "Deferred { state: Pending }");
    }
}
