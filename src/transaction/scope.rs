use super::{AsyncTransactionalContext, TransactionOptions, TransactionalContext};
use tracing::{debug, warn};

/// A transaction opened on a blocking context for the duration of one attempt.
///
/// The scope borrows the context exclusively; the operation reaches it through
/// [`context`](Self::context). Dropping a scope that was not committed rolls the
/// transaction back, which covers early returns, `?` and panics alike.
pub struct TransactionScope<'c, C: TransactionalContext> {
    context: &'c mut C,
    completed: bool,
}

impl<'c, C: TransactionalContext> TransactionScope<'c, C> {
    /// Opens a new transaction on `context`.
    pub fn begin(context: &'c mut C, options: &TransactionOptions) -> Result<Self, C::Error> {
        context.begin_transaction(options)?;
        Ok(Self {
            context,
            completed: false,
        })
    }

    pub fn context(&mut self) -> &mut C {
        self.context
    }

    /// Commits the transaction.
    ///
    /// On failure the scope is still released when it goes out of scope here.
    pub fn commit(mut self) -> Result<(), C::Error> {
        let result = self.context.commit_transaction();
        if result.is_ok() {
            self.completed = true;
        }
        result
    }

    fn release(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;

        // A failed commit may have closed the transaction on the store side.
        if !self.context.in_transaction() {
            return;
        }

        match self.context.rollback_transaction() {
            Ok(()) => debug!("transaction rolled back on scope release"),
            Err(err) => warn!(error = %err, "rollback failed while releasing transaction scope"),
        }
    }
}

impl<C: TransactionalContext> Drop for TransactionScope<'_, C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Async counterpart of [`TransactionScope`].
///
/// `Drop` cannot await, so normal paths end in [`commit`](Self::commit) or
/// [`release`](Self::release). A scope dropped without either, for example
/// because the surrounding future was dropped, falls back to
/// [`AsyncTransactionalContext::abandon_transaction`].
pub struct AsyncTransactionScope<'c, C: AsyncTransactionalContext> {
    context: &'c mut C,
    released: bool,
}

impl<'c, C: AsyncTransactionalContext> AsyncTransactionScope<'c, C> {
    pub async fn begin(
        context: &'c mut C,
        options: &TransactionOptions,
    ) -> Result<Self, C::Error> {
        context.begin_transaction(options).await?;
        Ok(Self {
            context,
            released: false,
        })
    }

    pub fn context(&mut self) -> &mut C {
        self.context
    }

    /// Commits the transaction, rolling back whatever is left open if the
    /// commit fails.
    pub async fn commit(mut self) -> Result<(), C::Error> {
        let result = self.context.commit_transaction().await;
        if result.is_err() {
            self.rollback_if_open().await;
        }
        self.released = true;
        result
    }

    /// Rolls the transaction back.
    pub async fn release(mut self) {
        self.rollback_if_open().await;
        self.released = true;
    }

    async fn rollback_if_open(&mut self) {
        if !self.context.in_transaction() {
            return;
        }

        match self.context.rollback_transaction().await {
            Ok(()) => debug!("transaction rolled back on scope release"),
            Err(err) => warn!(error = %err, "rollback failed while releasing transaction scope"),
        }
    }
}

impl<C: AsyncTransactionalContext> Drop for AsyncTransactionScope<'_, C> {
    fn drop(&mut self) {
        if self.released || !self.context.in_transaction() {
            return;
        }

        self.context.abandon_transaction();
        debug!("transaction abandoned by dropped scope");
        if self.context.in_transaction() {
            warn!("context still has an open transaction after abandoning it");
        }
    }
}
