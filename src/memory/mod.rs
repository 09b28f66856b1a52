// ============================================================================
// In-Memory Transactional Store
// ============================================================================
//
// A small key/value store with real transaction semantics and scripted
// failures. It is the reference context for the execution strategy: sessions
// buffer their writes until commit, and a FaultPlan decides which operations
// or commits fail (including commits that land but report failure).
//
// ============================================================================

pub mod fault;
pub mod session;

pub use fault::{CommitFault, FaultPlan};
pub use session::MemorySession;

use crate::policy::{ErrorKindDetector, TransientError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

/// Errors raised by the in-memory store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The commit was applied but its acknowledgement never arrived.
    #[error("Commit acknowledgement lost")]
    CommitAckLost,

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Lock error: {0}")]
    LockError(String),
}

impl TransientError for StoreError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout(_) | StoreError::ConnectionLost(_) | StoreError::CommitAckLost
        )
    }
}

/// Snapshot of the store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub begins: u64,
    /// Commits that were applied, acknowledged or not.
    pub commits: u64,
    pub rollbacks: u64,
    /// Reads and writes that reached the store, failed ones included.
    pub operations: u64,
}

#[derive(Default)]
struct Counters {
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    operations: AtomicU64,
}

#[derive(Default)]
struct StoreInner {
    rows: RwLock<HashMap<String, Value>>,
    faults: Mutex<FaultPlan>,
    counters: Counters,
    next_session_id: AtomicU64,
}

/// Shared key/value table. Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that will fail according to `plan`
    pub fn with_faults(plan: FaultPlan) -> Self {
        let store = Self::new();
        store.set_faults(plan);
        store
    }

    /// Replace the pending fault plan
    pub fn set_faults(&self, plan: FaultPlan) {
        *self
            .inner
            .faults
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = plan;
    }

    pub fn pending_faults(&self) -> usize {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Open a new session on this store
    pub fn session(&self) -> MemorySession {
        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed) + 1;
        MemorySession::new(id, self.clone())
    }

    /// Read a committed row, bypassing sessions and faults.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .rows
            .read()
            .ok()
            .and_then(|rows| rows.get(key).cloned())
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.inner.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        let counters = &self.inner.counters;
        StoreStats {
            begins: counters.begins.load(Ordering::Relaxed),
            commits: counters.commits.load(Ordering::Relaxed),
            rollbacks: counters.rollbacks.load(Ordering::Relaxed),
            operations: counters.operations.load(Ordering::Relaxed),
        }
    }

    /// Detector matching [`StoreError::is_transient`](TransientError::is_transient).
    pub fn transient_detector() -> ErrorKindDetector {
        ErrorKindDetector
    }

    // ------------------------------------------------------------------------
    // Session hooks
    // ------------------------------------------------------------------------

    fn lock_faults(&self) -> Result<std::sync::MutexGuard<'_, FaultPlan>, StoreError> {
        self.inner
            .faults
            .lock()
            .map_err(|_| StoreError::LockError("Failed to acquire fault plan lock".into()))
    }

    /// Counts an operation and fails it if the plan says so.
    pub(crate) fn check_operation(&self) -> Result<(), StoreError> {
        self.inner.counters.operations.fetch_add(1, Ordering::Relaxed);
        match self.lock_faults()?.next_operation_fault() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn record_begin(&self) {
        self.inner.counters.begins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.inner.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn read_committed(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let rows = self
            .inner
            .rows
            .read()
            .map_err(|_| StoreError::LockError("Failed to acquire store lock".into()))?;
        Ok(rows.get(key).cloned())
    }

    /// Applies `writes` atomically, honouring the next commit fault.
    pub(crate) fn apply(&self, writes: HashMap<String, Option<Value>>) -> Result<(), StoreError> {
        let lose_ack = match self.lock_faults()?.next_commit_fault() {
            Some(CommitFault::Reject(err)) => return Err(err),
            Some(CommitFault::LoseAck) => true,
            None => false,
        };

        self.write_rows(writes)?;
        if lose_ack {
            return Err(StoreError::CommitAckLost);
        }
        Ok(())
    }

    /// Applies a write made outside a transaction. Commit faults are left
    /// for transactional commits.
    pub(crate) fn apply_autocommit(
        &self,
        writes: HashMap<String, Option<Value>>,
    ) -> Result<(), StoreError> {
        self.write_rows(writes)
    }

    fn write_rows(&self, writes: HashMap<String, Option<Value>>) -> Result<(), StoreError> {
        let mut rows = self
            .inner
            .rows
            .write()
            .map_err(|_| StoreError::LockError("Failed to acquire store lock".into()))?;
        for (key, value) in writes {
            match value {
                Some(value) => rows.insert(key, value),
                None => rows.remove(&key),
            };
        }
        drop(rows);
        self.inner.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("rows", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
