//! Operation handles accepted by the retry executor.

use crate::deferred::Deferred;
use crate::errors::OperationError;

/// A zero-argument operation returning a deferred result.
///
/// The executor may invoke it several times, possibly from different
/// threads, but never concurrently within one retry cycle.
pub trait Operation<T>: Send + Sync {
    /// Starts one attempt of the operation.
    fn invoke(&self) -> Deferred<T>;
}

impl<T, F, R> Operation<T> for F
where
    F: Fn() -> R + Send + Sync,
    R: IntoDeferred<T>,
{
    fn invoke(&self) -> Deferred<T> {
        self().into_deferred()
    }
}

/// Conversion into a deferred result.
///
/// Lets an operation report a synchronous failure by returning `Err`; the
/// error is turned into an already-failed deferred result.
pub trait IntoDeferred<T> {
    /// Converts `self` into a deferred result.
    fn into_deferred(self) -> Deferred<T>;
}

impl<T> IntoDeferred<T> for Deferred<T>
where
    T: Clone + Send + 'static,
{
    fn into_deferred(self) -> Deferred<T> {
        self
    }
}

impl<T, E> IntoDeferred<T> for Result<Deferred<T>, E>
where
    T: Clone + Send + 'static,
    E: Into<OperationError>,
{
    fn into_deferred(self) -> Deferred<T> {
        match self {
            Ok(deferred) => deferred,
            Err(error) => Deferred::failed(Into::<OperationError>::into(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::DeferredState;

    #[test]
    fn test_closure_returning_deferred() {
        let op = || Deferred::fulfilled(1);
        let deferred: Deferred<i32> = op.invoke();
        assert_eq!(deferred.state(), DeferredState::Fulfilled);
    }

    #[test]
    fn test_synchronous_error_becomes_failed_deferred() {
        let op = || -> Result<Deferred<i32>, std::io::Error> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "Simulated error"))
        };
        let deferred: Deferred<i32> = op.invoke();
        assert_eq!(deferred.state(), DeferredState::Failed);
    }
}
