/// Decides which errors are worth another attempt.
///
/// Classification is store-specific, so the strategy takes it as injected
/// behaviour. Any `Fn(&E) -> bool` closure is a detector:
///
/// ```
/// use memodb_resilience::TransientErrorDetector;
///
/// let detector = |err: &std::io::Error| err.kind() == std::io::ErrorKind::TimedOut;
/// let timeout = std::io::Error::from(std::io::ErrorKind::TimedOut);
/// assert!(detector.is_transient(&timeout));
/// ```
pub trait TransientErrorDetector<E>: Send + Sync {
    /// Returns `true` when retrying after `error` is likely to succeed.
    fn is_transient(&self, error: &E) -> bool;

    /// Returns `true` when `error`, raised after a commit was issued, should be
    /// checked with the caller's verification query before anything else.
    ///
    /// Any commit-time failure can hide a commit that landed, so the default
    /// verifies all of them.
    fn should_verify_success_on(&self, _error: &E) -> bool {
        true
    }
}

impl<E, F> TransientErrorDetector<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_transient(&self, error: &E) -> bool {
        self(error)
    }
}

/// Errors that know whether they are transient.
pub trait TransientError {
    fn is_transient(&self) -> bool;
}

/// Detector that defers to [`TransientError::is_transient`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorKindDetector;

impl<E: TransientError> TransientErrorDetector<E> for ErrorKindDetector {
    fn is_transient(&self, error: &E) -> bool {
        error.is_transient()
    }
}

/// Detector that treats every error as fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverTransient;

impl<E> TransientErrorDetector<E> for NeverTransient {
    fn is_transient(&self, _error: &E) -> bool {
        false
    }
}
