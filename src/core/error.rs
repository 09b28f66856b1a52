use std::time::Duration;
use thiserror::Error;

/// Error returned by every execution-strategy entry point.
///
/// `E` is the caller's own error type. Fatal failures come back as
/// [`ExecutionError::Operation`] carrying the original value untouched, so
/// callers can keep matching on their own variants.
#[derive(Error, Debug)]
pub enum ExecutionError<E> {
    /// The operation (or the verification query) failed with an error the
    /// strategy does not retry.
    #[error(transparent)]
    Operation(E),

    /// Every permitted attempt failed with a transient error.
    #[error(
        "Maximum number of retries exceeded after {attempts} attempt(s) in {elapsed:?}; \
         the most recent failure is the source of this error"
    )]
    RetryLimitExceeded {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: E,
    },

    /// The cancellation token fired before an attempt started or during a backoff delay.
    #[error("Execution was cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// A retrying strategy was asked to open a transaction on a context that
    /// already has a user-initiated one.
    #[error(
        "The configured execution strategy does not support user-initiated transactions; \
         run the whole unit of work through the strategy instead"
    )]
    ExistingTransaction,
}

impl<E> ExecutionError<E> {
    /// Returns `true` when the retry budget was exhausted.
    pub fn is_retry_limit_exceeded(&self) -> bool {
        matches!(self, Self::RetryLimitExceeded { .. })
    }

    /// Returns `true` when execution stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Borrows the underlying caller error, if there is one.
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Operation(err) | Self::RetryLimitExceeded { source: err, .. } => Some(err),
            Self::Cancelled { .. } | Self::ExistingTransaction => None,
        }
    }

    /// Unwraps the underlying caller error, if there is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Operation(err) | Self::RetryLimitExceeded { source: err, .. } => Some(err),
            Self::Cancelled { .. } | Self::ExistingTransaction => None,
        }
    }
}

pub type StrategyResult<T, E> = std::result::Result<T, ExecutionError<E>>;

/// Rejected retry configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid retry configuration: {0}")]
    Invalid(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}
