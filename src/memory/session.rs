use super::{MemoryStore, StoreError};
use crate::transaction::{
    AsyncTransactionalContext, IsolationLevel, TransactionOptions, TransactionalContext,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    InTransaction,
    Closed,
}

/// Connection-like handle onto a [`MemoryStore`].
///
/// Outside a transaction every write is applied immediately and is not
/// subject to commit faults. Inside one, writes are buffered and become
/// visible to other sessions on commit.
pub struct MemorySession {
    id: u64,
    store: MemoryStore,
    state: SessionState,
    /// Buffered writes; `None` marks a delete.
    pending: HashMap<String, Option<Value>>,
    isolation_level: Option<IsolationLevel>,
}

impl MemorySession {
    pub(crate) fn new(id: u64, store: MemoryStore) -> Self {
        Self {
            id,
            store,
            state: SessionState::Active,
            pending: HashMap::new(),
            isolation_level: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Isolation level requested by the current or most recent transaction.
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.state == SessionState::Closed {
            return Err(StoreError::SessionClosed);
        }
        Ok(())
    }

    /// Read a row, seeing this session's uncommitted writes
    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_open()?;
        self.store.check_operation()?;

        match self.pending.get(key) {
            Some(buffered) => Ok(buffered.clone()),
            None => self.store.read_committed(key),
        }
    }

    /// Insert or replace a row
    pub fn put(&mut self, key: impl Into<String>, value: Value) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.store.check_operation()?;
        self.write(key.into(), Some(value))
    }

    /// Insert a row that must not exist yet
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<(), StoreError> {
        let key = key.into();
        if self.get(&key)?.is_some() {
            return Err(StoreError::DuplicateKey(key));
        }
        self.write(key, Some(value))
    }

    /// Delete a row, returning whether it existed
    pub fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        let existed = self.get(key)?.is_some();
        if existed {
            self.write(key.to_string(), None)?;
        }
        Ok(existed)
    }

    fn write(&mut self, key: String, value: Option<Value>) -> Result<(), StoreError> {
        if self.state == SessionState::InTransaction {
            self.pending.insert(key, value);
            return Ok(());
        }
        self.store.apply_autocommit(HashMap::from([(key, value)]))
    }

    pub fn begin(&mut self, options: &TransactionOptions) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.state == SessionState::InTransaction {
            return Err(StoreError::TransactionError("Transaction already active".into()));
        }

        self.store.record_begin();
        self.state = SessionState::InTransaction;
        self.isolation_level = options.isolation_level;
        Ok(())
    }

    /// Commit the current transaction
    ///
    /// The transaction is closed whatever the outcome, as a server would do
    /// after a failed commit.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        if self.state != SessionState::InTransaction {
            return Err(StoreError::TransactionError("No active transaction".into()));
        }

        self.state = SessionState::Active;
        let writes = std::mem::take(&mut self.pending);
        self.store.apply(writes)
    }

    /// Rollback the current transaction
    pub fn rollback(&mut self) -> Result<(), StoreError> {
        if self.state != SessionState::InTransaction {
            return Err(StoreError::TransactionError("No active transaction".into()));
        }

        self.state = SessionState::Active;
        self.pending.clear();
        self.store.record_rollback();
        Ok(())
    }

    pub fn is_in_transaction(&self) -> bool {
        self.state == SessionState::InTransaction
    }

    /// Close the session, rolling back any open transaction
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.state == SessionState::InTransaction {
            self.rollback()?;
        }

        self.state = SessionState::Closed;
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl TransactionalContext for MemorySession {
    type Error = StoreError;

    fn begin_transaction(&mut self, options: &TransactionOptions) -> Result<(), StoreError> {
        self.begin(options)
    }

    fn commit_transaction(&mut self) -> Result<(), StoreError> {
        self.commit()
    }

    fn rollback_transaction(&mut self) -> Result<(), StoreError> {
        self.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.is_in_transaction()
    }
}

#[async_trait]
impl AsyncTransactionalContext for MemorySession {
    type Error = StoreError;

    async fn begin_transaction(&mut self, options: &TransactionOptions) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.begin(options)
    }

    async fn commit_transaction(&mut self) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.commit()
    }

    async fn rollback_transaction(&mut self) -> Result<(), StoreError> {
        self.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.is_in_transaction()
    }

    fn abandon_transaction(&mut self) {
        if self.is_in_transaction() {
            let _ = self.rollback();
        }
    }
}
