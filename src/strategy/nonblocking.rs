impl<D> ExecutionStrategy<D> {
    /// Async counterpart of [`execute`](Self::execute).
    ///
    /// `token` is observed before every attempt and while waiting between
    /// attempts; it is also passed to the operation so long-running work can
    /// stop early.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodb_resilience::memory::{MemoryStore, StoreError};
    /// use memodb_resilience::{CancellationToken, ExecutionStrategy, RetryConfig};
    ///
    /// # tokio_test::block_on(async {
    /// let store = MemoryStore::new();
    /// let mut session = store.session();
    /// let strategy = ExecutionStrategy::new(RetryConfig::new(), MemoryStore::transient_detector());
    /// let token = CancellationToken::new();
    ///
    /// let stored = strategy
    ///     .execute_async(
    ///         &mut session,
    ///         "greeting".to_string(),
    ///         |session, key, _token| {
    ///             Box::pin(async move {
    ///                 session.put(key.as_str(), serde_json::json!("hello"))?;
    ///                 Ok::<_, StoreError>(true)
    ///             })
    ///         },
    ///         &token,
    ///     )
    ///     .await
    ///     .unwrap();
    ///
    /// assert!(stored);
    /// # });
    /// ```
    pub async fn execute_async<C, S, R, E, F>(
        &self,
        context: &mut C,
        state: S,
        operation: F,
        token: &CancellationToken,
    ) -> StrategyResult<R, E>
    where
        C: Send,
        S: Send + Sync,
        R: Send,
        E: fmt::Display + Send,
        F: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>>
            + Send,
        D: TransientErrorDetector<E>,
    {
        let mut execution =
            PlainExecution::new(state, operation, None::<NoVerifierAsync<C, S, R, E>>);
        self.drive_async(context, &mut execution, token).await
    }

    /// Async counterpart of [`execute_with_verification`](Self::execute_with_verification).
    pub async fn execute_with_verification_async<C, S, R, E, F, V>(
        &self,
        context: &mut C,
        state: S,
        operation: F,
        verify_succeeded: V,
        token: &CancellationToken,
    ) -> StrategyResult<R, E>
    where
        C: Send,
        S: Send + Sync,
        R: Send,
        E: fmt::Display + Send,
        F: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>>
            + Send,
        V: for<'a> FnMut(
                &'a mut C,
                &'a S,
                &'a CancellationToken,
            ) -> BoxFuture<'a, Result<ExecutionResult<R>, E>>
            + Send,
        D: TransientErrorDetector<E>,
    {
        let mut execution = PlainExecution::new(state, operation, Some(verify_succeeded));
        self.drive_async(context, &mut execution, token).await
    }

    /// Async counterpart of [`execute_in_transaction`](Self::execute_in_transaction).
    ///
    /// A commit that has been issued is always awaited to completion, even if
    /// `token` fires meanwhile.
    pub async fn execute_in_transaction_async<C, S, R, E, F, V>(
        &self,
        context: &mut C,
        state: S,
        operation: F,
        verify_succeeded: V,
        token: &CancellationToken,
    ) -> StrategyResult<R, E>
    where
        C: AsyncTransactionalContext,
        S: Send + Sync,
        R: Send,
        E: From<C::Error> + fmt::Display + Send,
        F: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>>
            + Send,
        V: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<bool, E>>
            + Send,
        D: TransientErrorDetector<E>,
    {
        self.execute_in_transaction_with_async(
            context,
            TransactionOptions::default(),
            state,
            operation,
            verify_succeeded,
            token,
        )
        .await
    }

    /// Async counterpart of [`execute_in_transaction_with`](Self::execute_in_transaction_with).
    pub async fn execute_in_transaction_with_async<C, S, R, E, F, V>(
        &self,
        context: &mut C,
        options: TransactionOptions,
        state: S,
        operation: F,
        verify_succeeded: V,
        token: &CancellationToken,
    ) -> StrategyResult<R, E>
    where
        C: AsyncTransactionalContext,
        S: Send + Sync,
        R: Send,
        E: From<C::Error> + fmt::Display + Send,
        F: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>>
            + Send,
        V: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<bool, E>>
            + Send,
        D: TransientErrorDetector<E>,
    {
        self.ensure_no_user_transaction(context.in_transaction(), suspend::is_suspended_async())?;

        let mut execution =
            TransactionalExecution::new(state, options, operation, Some(verify_succeeded));
        self.drive_async(context, &mut execution, token).await
    }

    /// Async counterpart of
    /// [`execute_in_transaction_unverified`](Self::execute_in_transaction_unverified).
    pub async fn execute_in_transaction_unverified_async<C, S, R, E, F>(
        &self,
        context: &mut C,
        state: S,
        operation: F,
        token: &CancellationToken,
    ) -> StrategyResult<R, E>
    where
        C: AsyncTransactionalContext,
        S: Send + Sync,
        R: Send,
        E: From<C::Error> + fmt::Display + Send,
        F: for<'a> FnMut(&'a mut C, &'a S, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>>
            + Send,
        D: TransientErrorDetector<E>,
    {
        self.ensure_no_user_transaction(context.in_transaction(), suspend::is_suspended_async())?;

        let mut execution = TransactionalExecution::new(
            state,
            TransactionOptions::default(),
            operation,
            None::<NoCommitVerifierAsync<C, S, E>>,
        );
        self.drive_async(context, &mut execution, token).await
    }

    async fn drive_async<C, X>(
        &self,
        context: &mut C,
        execution: &mut X,
        token: &CancellationToken,
    ) -> StrategyResult<X::Output, X::Error>
    where
        C: Send,
        X: AsyncExecution<C>,
        X::Error: fmt::Display,
        D: TransientErrorDetector<X::Error>,
    {
        if suspend::is_suspended_async() {
            if token.is_cancelled() {
                return Err(ExecutionError::Cancelled { attempts: 0 });
            }
            debug!("nested execution, running once without retries");
            return execution
                .attempt(context, token)
                .await
                .map_err(ExecutionError::Operation);
        }

        let mut tracker = RetryTracker::start();
        loop {
            if token.is_cancelled() {
                debug!(attempts = tracker.attempts(), "execution cancelled before attempt");
                return Err(ExecutionError::Cancelled {
                    attempts: tracker.attempts(),
                });
            }

            let attempt = tracker.begin_attempt();

            let error = match suspend::suspended_async(execution.attempt(context, token)).await {
                Ok(output) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(output);
                }
                Err(error) => error,
            };

            if execution.can_verify() && self.policy.should_verify_success_on(&error) {
                match suspend::suspended_async(execution.verify(context, token)).await {
                    Ok(ExecutionResult::Succeeded(output)) => {
                        debug!(attempt, error = %error, "failure verified as already applied");
                        return Ok(output);
                    }
                    Ok(ExecutionResult::Unresolved) => {
                        debug!(attempt, "failure not verified, treating as not applied");
                    }
                    Err(verify_error) => return Err(ExecutionError::Operation(verify_error)),
                }
            }

            let delay = self.schedule_retry(error, &tracker)?;

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(attempts = tracker.attempts(), "execution cancelled during backoff");
                    return Err(ExecutionError::Cancelled {
                        attempts: tracker.attempts(),
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
