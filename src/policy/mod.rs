// ============================================================================
// Retry Policy
// ============================================================================
//
// Classifies failures and computes the wait before the next attempt.
//
// Policy configuration is shared and immutable; per-call bookkeeping lives in
// a RetryTracker that is created fresh for every logical call, so two calls
// through the same strategy never see each other's attempt counts.
//
// ============================================================================

pub mod config;
pub mod detector;

pub use config::RetryConfig;
pub use detector::{ErrorKindDetector, NeverTransient, TransientError, TransientErrorDetector};

use std::time::{Duration, Instant};

/// Why the policy refused another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The error is not transient.
    Fatal,
    /// The attempt count or elapsed-time budget is spent.
    LimitExceeded,
}

/// Answer to "should this failure be retried?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp(GiveUpReason),
}

/// Attempt bookkeeping for a single logical call.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    attempts: u32,
    started_at: Instant,
}

impl RetryTracker {
    pub fn start() -> Self {
        Self {
            attempts: 0,
            started_at: Instant::now(),
        }
    }

    /// Marks the beginning of a new attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Transient-fault classifier combined with the retry budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy<D> {
    config: RetryConfig,
    detector: D,
}

impl<D> RetryPolicy<D> {
    pub fn new(config: RetryConfig, detector: D) -> Self {
        Self { config, detector }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Decides whether the attempt that just failed with `error` gets a successor.
    pub fn should_retry<E>(&self, error: &E, tracker: &RetryTracker) -> RetryDecision
    where
        D: TransientErrorDetector<E>,
    {
        if !self.detector.is_transient(error) {
            return RetryDecision::GiveUp(GiveUpReason::Fatal);
        }

        if tracker.attempts() >= self.config.max_attempts() {
            return RetryDecision::GiveUp(GiveUpReason::LimitExceeded);
        }

        let delay = self.config.next_delay(tracker.attempts().saturating_sub(1));

        if let Some(budget) = self.config.get_max_elapsed() {
            if tracker.elapsed().saturating_add(delay) > budget {
                return RetryDecision::GiveUp(GiveUpReason::LimitExceeded);
            }
        }

        RetryDecision::RetryAfter(delay)
    }

    /// Returns `true` when a commit-time `error` should be checked with the verifier.
    pub fn should_verify_success_on<E>(&self, error: &E) -> bool
    where
        D: TransientErrorDetector<E>,
    {
        self.detector.should_verify_success_on(error)
    }
}
