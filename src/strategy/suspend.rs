//! Suspension primitives and the nested-execution flag.

use std::cell::Cell;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// How the blocking surface waits between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Records requested delays instead of sleeping.
///
/// Useful in tests that want to assert on the backoff sequence without
/// waiting for it.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delay);
    }
}

impl<T: Sleeper + ?Sized> Sleeper for std::sync::Arc<T> {
    fn sleep(&self, delay: Duration) {
        (**self).sleep(delay)
    }
}

// An execution started while another one is running its operation on the
// same thread (or task) runs once: the outer execution owns the retries.

thread_local! {
    static SUSPENDED: Cell<bool> = const { Cell::new(false) };
}

tokio::task_local! {
    static SUSPENDED_TASK: bool;
}

pub(crate) fn is_suspended() -> bool {
    SUSPENDED.with(Cell::get)
}

/// Runs `f` with retries suspended for nested executions on this thread.
pub(crate) fn suspended<T>(f: impl FnOnce() -> T) -> T {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            SUSPENDED.with(|flag| flag.set(self.0));
        }
    }

    let _restore = Restore(SUSPENDED.with(|flag| flag.replace(true)));
    f()
}

pub(crate) fn is_suspended_async() -> bool {
    SUSPENDED_TASK.try_with(|flag| *flag).unwrap_or(false)
}

/// Awaits `future` with retries suspended for nested executions in this task.
pub(crate) async fn suspended_async<F: Future>(future: F) -> F::Output {
    SUSPENDED_TASK.scope(true, future).await
}
