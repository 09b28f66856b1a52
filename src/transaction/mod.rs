// ============================================================================
// Transaction Primitive
// ============================================================================
//
// The execution strategy never talks to a store directly. It only needs a
// context that can open, commit and roll back a transaction, which is what the
// two traits below describe (blocking and async flavours).
//
// Scope guards make sure a transaction opened for an attempt is released on
// every exit path before control returns to the retry loop.
//
// ============================================================================

pub mod scope;

pub use scope::{AsyncTransactionScope, TransactionScope};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Isolation level requested when a transaction is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Options applied to every transaction the strategy opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOptions {
    /// `None` leaves the store default in place.
    pub isolation_level: Option<IsolationLevel>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }
}

/// A blocking data-access context with explicit transaction control.
///
/// Similar to a `postgres::Client` or a pooled connection: one transaction at
/// a time, opened and closed on the context itself.
pub trait TransactionalContext {
    type Error: std::fmt::Display;

    fn begin_transaction(&mut self, options: &TransactionOptions) -> Result<(), Self::Error>;

    fn commit_transaction(&mut self) -> Result<(), Self::Error>;

    fn rollback_transaction(&mut self) -> Result<(), Self::Error>;

    /// Returns `true` while a transaction is open on this context.
    fn in_transaction(&self) -> bool;
}

/// Async counterpart of [`TransactionalContext`].
#[async_trait]
pub trait AsyncTransactionalContext: Send {
    type Error: std::fmt::Display + Send;

    async fn begin_transaction(&mut self, options: &TransactionOptions)
    -> Result<(), Self::Error>;

    async fn commit_transaction(&mut self) -> Result<(), Self::Error>;

    async fn rollback_transaction(&mut self) -> Result<(), Self::Error>;

    fn in_transaction(&self) -> bool;

    /// Discards the open transaction without awaiting.
    ///
    /// Called from `Drop` when the future driving an attempt is dropped with
    /// the transaction still open. Must leave the context outside a
    /// transaction; a store that cannot roll back synchronously should mark
    /// the connection broken instead.
    fn abandon_transaction(&mut self);
}
