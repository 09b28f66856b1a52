//! Per-call carriers threaded through every attempt.
//!
//! A carrier owns the caller's operation, the optional verifier and the
//! caller state for the whole logical call. The retry loop only sees the
//! [`BlockingExecution`] / [`AsyncExecution`] view of it, so the same loop
//! drives plain and transactional work.

use crate::core::ExecutionResult;
use crate::transaction::{
    AsyncTransactionScope, AsyncTransactionalContext, TransactionOptions, TransactionScope,
    TransactionalContext,
};
use futures::future::BoxFuture;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// One unit of retryable work, blocking flavour.
pub(crate) trait BlockingExecution<C> {
    type Output;
    type Error;

    fn attempt(&mut self, context: &mut C) -> Result<Self::Output, Self::Error>;

    /// Whether the failure of the last attempt may be checked with a verifier.
    fn can_verify(&self) -> bool;

    fn verify(&mut self, context: &mut C) -> Result<ExecutionResult<Self::Output>, Self::Error>;
}

/// One unit of retryable work, async flavour.
pub(crate) trait AsyncExecution<C>: Send {
    type Output: Send;
    type Error: Send;

    fn attempt<'a>(
        &'a mut self,
        context: &'a mut C,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Self::Output, Self::Error>>;

    fn can_verify(&self) -> bool;

    fn verify<'a>(
        &'a mut self,
        context: &'a mut C,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ExecutionResult<Self::Output>, Self::Error>>;
}

/// Where the current transactional attempt stands.
///
/// The value produced by the operation is only kept once the commit has
/// failed, so a verifier can never hand back a result from an attempt that
/// did not reach its commit.
enum AttemptPhase<R> {
    Running,
    Committing,
    CommitFailed(R),
}

// ----------------------------------------------------------------------------
// Plain execution
// ----------------------------------------------------------------------------

/// Operation + optional verifier + state, no transaction boundary.
pub(crate) struct PlainExecution<S, R, E, F, V> {
    state: S,
    operation: F,
    verify_succeeded: Option<V>,
    _marker: PhantomData<fn() -> (R, E)>,
}

impl<S, R, E, F, V> PlainExecution<S, R, E, F, V> {
    pub(crate) fn new(state: S, operation: F, verify_succeeded: Option<V>) -> Self {
        Self {
            state,
            operation,
            verify_succeeded,
            _marker: PhantomData,
        }
    }
}

impl<C, S, R, E, F, V> BlockingExecution<C> for PlainExecution<S, R, E, F, V>
where
    F: FnMut(&mut C, &S) -> Result<R, E>,
    V: FnMut(&mut C, &S) -> Result<ExecutionResult<R>, E>,
{
    type Output = R;
    type Error = E;

    fn attempt(&mut self, context: &mut C) -> Result<R, E> {
        (self.operation)(context, &self.state)
    }

    fn can_verify(&self) -> bool {
        self.verify_succeeded.is_some()
    }

    fn verify(&mut self, context: &mut C) -> Result<ExecutionResult<R>, E> {
        match self.verify_succeeded.as_mut() {
            Some(verify) => verify(context, &self.state),
            None => Ok(ExecutionResult::Unresolved),
        }
    }
}

impl<C, S, R, E, F, V> AsyncExecution<C> for PlainExecution<S, R, E, F, V>
where
    C: Send,
    S: Send + Sync,
    R: Send,
    E: Send,
    F: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>>
        + Send,
    V: for<'a> FnMut(
            &'a mut C,
            &'a S,
            &'a CancellationToken,
        ) -> BoxFuture<'a, Result<ExecutionResult<R>, E>>
        + Send,
{
    type Output = R;
    type Error = E;

    fn attempt<'a>(
        &'a mut self,
        context: &'a mut C,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<R, E>> {
        (self.operation)(context, &self.state, token)
    }

    fn can_verify(&self) -> bool {
        self.verify_succeeded.is_some()
    }

    fn verify<'a>(
        &'a mut self,
        context: &'a mut C,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ExecutionResult<R>, E>> {
        match self.verify_succeeded.as_mut() {
            Some(verify) => verify(context, &self.state, token),
            None => Box::pin(async { Ok(ExecutionResult::Unresolved) }),
        }
    }
}

// ----------------------------------------------------------------------------
// Transactional execution
// ----------------------------------------------------------------------------

/// Operation run inside a fresh transaction per attempt, with commit
/// ambiguity resolved by an optional verifier.
pub(crate) struct TransactionalExecution<S, R, E, F, V> {
    state: S,
    options: TransactionOptions,
    operation: F,
    verify_succeeded: Option<V>,
    phase: AttemptPhase<R>,
    _marker: PhantomData<fn() -> E>,
}

impl<S, R, E, F, V> TransactionalExecution<S, R, E, F, V> {
    pub(crate) fn new(
        state: S,
        options: TransactionOptions,
        operation: F,
        verify_succeeded: Option<V>,
    ) -> Self {
        Self {
            state,
            options,
            operation,
            verify_succeeded,
            phase: AttemptPhase::Running,
            _marker: PhantomData,
        }
    }

    fn verification_pending(&self) -> bool {
        self.verify_succeeded.is_some() && matches!(self.phase, AttemptPhase::CommitFailed(_))
    }

    /// Takes the pre-commit result out of a failed commit, if there is one.
    /// Consuming it keeps verification to a single call per attempt.
    fn take_uncommitted(&mut self) -> Option<R> {
        match std::mem::replace(&mut self.phase, AttemptPhase::Running) {
            AttemptPhase::CommitFailed(result) => Some(result),
            AttemptPhase::Running | AttemptPhase::Committing => None,
        }
    }
}

impl<C, S, R, E, F, V> BlockingExecution<C> for TransactionalExecution<S, R, E, F, V>
where
    C: TransactionalContext,
    E: From<C::Error>,
    F: FnMut(&mut C, &S) -> Result<R, E>,
    V: FnMut(&mut C, &S) -> Result<bool, E>,
{
    type Output = R;
    type Error = E;

    fn attempt(&mut self, context: &mut C) -> Result<R, E> {
        self.phase = AttemptPhase::Running;

        let mut scope = TransactionScope::begin(context, &self.options)?;
        let result = (self.operation)(scope.context(), &self.state)?;

        self.phase = AttemptPhase::Committing;

        match scope.commit() {
            Ok(()) => Ok(result),
            Err(err) => {
                self.phase = AttemptPhase::CommitFailed(result);
                Err(E::from(err))
            }
        }
    }

    fn can_verify(&self) -> bool {
        self.verification_pending()
    }

    fn verify(&mut self, context: &mut C) -> Result<ExecutionResult<R>, E> {
        let Some(result) = self.take_uncommitted() else {
            return Ok(ExecutionResult::Unresolved);
        };
        let Some(verify) = self.verify_succeeded.as_mut() else {
            return Ok(ExecutionResult::Unresolved);
        };

        let succeeded = verify(context, &self.state)?;
        Ok(ExecutionResult::new(succeeded, result))
    }
}

impl<C, S, R, E, F, V> AsyncExecution<C> for TransactionalExecution<S, R, E, F, V>
where
    C: AsyncTransactionalContext,
    S: Send + Sync,
    R: Send,
    E: From<C::Error> + Send,
    F: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>>
        + Send,
    V: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<bool, E>>
        + Send,
{
    type Output = R;
    type Error = E;

    fn attempt<'a>(
        &'a mut self,
        context: &'a mut C,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<R, E>> {
        Box::pin(async move {
            self.phase = AttemptPhase::Running;

            let mut scope = AsyncTransactionScope::begin(context, &self.options).await?;
            let result = match (self.operation)(scope.context(), &self.state, token).await {
                Ok(result) => result,
                Err(err) => {
                    scope.release().await;
                    return Err(err);
                }
            };

            // The commit is awaited without watching the token: once it has
            // been issued, cancellation only affects whether another attempt runs.
            self.phase = AttemptPhase::Committing;
            match scope.commit().await {
                Ok(()) => Ok(result),
                Err(err) => {
                    self.phase = AttemptPhase::CommitFailed(result);
                    Err(E::from(err))
                }
            }
        })
    }

    fn can_verify(&self) -> bool {
        self.verification_pending()
    }

    fn verify<'a>(
        &'a mut self,
        context: &'a mut C,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ExecutionResult<R>, E>> {
        Box::pin(async move {
            let Some(result) = self.take_uncommitted() else {
                return Ok(ExecutionResult::Unresolved);
            };
            let Some(verify) = self.verify_succeeded.as_mut() else {
                return Ok(ExecutionResult::Unresolved);
            };

            let succeeded = verify(context, &self.state, token).await?;
            Ok(ExecutionResult::new(succeeded, result))
        })
    }
}
