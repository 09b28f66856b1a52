// ============================================================================
// Execution Strategy
// ============================================================================
//
// Drives a unit of work through repeated attempts:
//
//   Idle ──> Attempting ──ok──> Succeeded
//               │
//               ├──commit failed + verified──> Succeeded (pre-commit result)
//               ├──transient──> (delay) ──> Attempting
//               └──fatal / budget spent──> Failed
//
// The state machine is written once over the `BlockingExecution` and
// `AsyncExecution` carriers. The blocking and async surfaces only differ in
// how they wait between attempts and in cancellation support.
//
// ============================================================================

mod carrier;
pub mod suspend;

pub use suspend::{RecordingSleeper, Sleeper, ThreadSleeper};

use crate::core::{ConfigError, ExecutionError, ExecutionResult, StrategyResult};
use crate::policy::{
    GiveUpReason, NeverTransient, RetryConfig, RetryDecision, RetryPolicy, RetryTracker,
    TransientErrorDetector,
};
use crate::transaction::{AsyncTransactionalContext, TransactionOptions, TransactionalContext};
use carrier::{AsyncExecution, BlockingExecution, PlainExecution, TransactionalExecution};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Notification sent before the strategy waits for the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEvent {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    /// Rendered error of the failed attempt.
    pub error: String,
}

type RetryListener = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

// Placeholder verifier types for entry points that take no verifier.
type NoVerifier<C, S, R, E> = fn(&mut C, &S) -> Result<ExecutionResult<R>, E>;
type NoCommitVerifier<C, S, E> = fn(&mut C, &S) -> Result<bool, E>;
type NoVerifierAsync<C, S, R, E> =
    for<'a> fn(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<ExecutionResult<R>, E>>;
type NoCommitVerifierAsync<C, S, E> =
    for<'a> fn(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<bool, E>>;

/// Retrying executor for operations against a data store.
///
/// The strategy is immutable and can be shared between threads; every call
/// gets its own attempt bookkeeping.
///
/// # Examples
///
/// ```
/// use memodb_resilience::{ExecutionStrategy, RetryConfig};
/// use std::time::Duration;
///
/// let strategy = ExecutionStrategy::new(
///     RetryConfig::new().max_retry_count(3).base_delay(Duration::ZERO),
///     |err: &String| err.contains("timeout"),
/// );
///
/// let mut calls = 0;
/// let value = strategy
///     .retry(|| {
///         calls += 1;
///         if calls < 3 { Err("timeout".to_string()) } else { Ok(42) }
///     })
///     .unwrap();
///
/// assert_eq!(value, 42);
/// assert_eq!(calls, 3);
/// ```
pub struct ExecutionStrategy<D> {
    policy: RetryPolicy<D>,
    sleeper: Arc<dyn Sleeper>,
    retry_listener: Option<RetryListener>,
}

impl<D> ExecutionStrategy<D> {
    /// Create a strategy from a retry configuration and a transient-error detector
    pub fn new(config: RetryConfig, detector: D) -> Self {
        Self {
            policy: RetryPolicy::new(config, detector),
            sleeper: Arc::new(ThreadSleeper),
            retry_listener: None,
        }
    }

    /// Like [`new`](Self::new) but validates the configuration first.
    pub fn try_new(config: RetryConfig, detector: D) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config, detector))
    }

    /// Replace how the blocking surface waits between attempts
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Register a callback invoked before every retry
    pub fn with_retry_listener(
        mut self,
        listener: impl Fn(&RetryEvent) + Send + Sync + 'static,
    ) -> Self {
        self.retry_listener = Some(Arc::new(listener));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        self.policy.config()
    }

    pub fn policy(&self) -> &RetryPolicy<D> {
        &self.policy
    }

    /// Returns `true` when a failed operation can be attempted again.
    pub fn retries_on_failure(&self) -> bool {
        self.policy.config().retries_on_failure()
    }

    /// Turns the failure of the attempt recorded in `tracker` into either the
    /// delay before the next attempt or the final error of the call.
    fn schedule_retry<E>(&self, error: E, tracker: &RetryTracker) -> StrategyResult<Duration, E>
    where
        E: fmt::Display,
        D: TransientErrorDetector<E>,
    {
        match self.policy.should_retry(&error, tracker) {
            RetryDecision::GiveUp(GiveUpReason::Fatal) => Err(ExecutionError::Operation(error)),
            RetryDecision::GiveUp(GiveUpReason::LimitExceeded) => {
                warn!(
                    attempts = tracker.attempts(),
                    elapsed_ms = tracker.elapsed().as_millis() as u64,
                    error = %error,
                    "retry limit exceeded"
                );
                Err(ExecutionError::RetryLimitExceeded {
                    attempts: tracker.attempts(),
                    elapsed: tracker.elapsed(),
                    source: error,
                })
            }
            RetryDecision::RetryAfter(delay) => {
                let max_attempts = self.policy.config().max_attempts();
                warn!(
                    attempt = tracker.attempts(),
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying after backoff"
                );
                if let Some(listener) = &self.retry_listener {
                    listener(&RetryEvent {
                        attempt: tracker.attempts(),
                        max_attempts,
                        delay,
                        error: error.to_string(),
                    });
                }
                Ok(delay)
            }
        }
    }
}

impl ExecutionStrategy<NeverTransient> {
    /// A strategy that runs every operation exactly once.
    pub fn non_retrying() -> Self {
        Self::new(RetryConfig::no_retry(), NeverTransient)
    }
}

impl<D: Clone> Clone for ExecutionStrategy<D> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            sleeper: Arc::clone(&self.sleeper),
            retry_listener: self.retry_listener.clone(),
        }
    }
}

impl<D> fmt::Debug for ExecutionStrategy<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStrategy")
            .field("config", self.policy.config())
            .field("retry_listener", &self.retry_listener.is_some())
            .finish()
    }
}

// Keep the surfaces split by responsibility, the same state machine backs all of them.
include!("strategy/blocking.rs");
include!("strategy/nonblocking.rs");
include!("strategy/adapters.rs");
