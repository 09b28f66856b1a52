impl<D> ExecutionStrategy<D> {
    /// Executes `operation` on `context`, retrying transient failures.
    ///
    /// `state` is handed to every attempt by reference, so the attempts rerun
    /// the same unit of work rather than a re-captured one. The operation must
    /// be safe to run more than once.
    pub fn execute<C, S, R, E, F>(&self, context: &mut C, state: S, operation: F) -> StrategyResult<R, E>
    where
        F: FnMut(&mut C, &S) -> Result<R, E>,
        E: fmt::Display,
        D: TransientErrorDetector<E>,
    {
        let mut execution = PlainExecution::new(state, operation, None::<NoVerifier<C, S, R, E>>);
        self.drive_blocking(context, &mut execution)
    }

    /// Executes `operation`, consulting `verify_succeeded` after every
    /// failure that the detector marks for verification.
    ///
    /// When the verifier reports [`ExecutionResult::Succeeded`], its value is
    /// returned and the failure is considered resolved.
    pub fn execute_with_verification<C, S, R, E, F, V>(
        &self,
        context: &mut C,
        state: S,
        operation: F,
        verify_succeeded: V,
    ) -> StrategyResult<R, E>
    where
        F: FnMut(&mut C, &S) -> Result<R, E>,
        V: FnMut(&mut C, &S) -> Result<ExecutionResult<R>, E>,
        E: fmt::Display,
        D: TransientErrorDetector<E>,
    {
        let mut execution = PlainExecution::new(state, operation, Some(verify_succeeded));
        self.drive_blocking(context, &mut execution)
    }

    /// Executes `operation` inside a new transaction per attempt.
    ///
    /// If the commit fails, `verify_succeeded` is asked whether the work is
    /// already durable. When it is, the value produced before the commit is
    /// returned and the operation is not run again.
    pub fn execute_in_transaction<C, S, R, E, F, V>(
        &self,
        context: &mut C,
        state: S,
        operation: F,
        verify_succeeded: V,
    ) -> StrategyResult<R, E>
    where
        C: TransactionalContext,
        E: From<C::Error> + fmt::Display,
        F: FnMut(&mut C, &S) -> Result<R, E>,
        V: FnMut(&mut C, &S) -> Result<bool, E>,
        D: TransientErrorDetector<E>,
    {
        self.execute_in_transaction_with(
            context,
            TransactionOptions::default(),
            state,
            operation,
            verify_succeeded,
        )
    }

    /// [`execute_in_transaction`](Self::execute_in_transaction) with explicit
    /// transaction options.
    pub fn execute_in_transaction_with<C, S, R, E, F, V>(
        &self,
        context: &mut C,
        options: TransactionOptions,
        state: S,
        operation: F,
        verify_succeeded: V,
    ) -> StrategyResult<R, E>
    where
        C: TransactionalContext,
        E: From<C::Error> + fmt::Display,
        F: FnMut(&mut C, &S) -> Result<R, E>,
        V: FnMut(&mut C, &S) -> Result<bool, E>,
        D: TransientErrorDetector<E>,
    {
        self.ensure_no_user_transaction(context.in_transaction(), suspend::is_suspended())?;

        let mut execution =
            TransactionalExecution::new(state, options, operation, Some(verify_succeeded));
        self.drive_blocking(context, &mut execution)
    }

    /// Executes `operation` inside a new transaction per attempt without
    /// commit verification: a failed commit is always treated as not applied.
    pub fn execute_in_transaction_unverified<C, S, R, E, F>(
        &self,
        context: &mut C,
        state: S,
        operation: F,
    ) -> StrategyResult<R, E>
    where
        C: TransactionalContext,
        E: From<C::Error> + fmt::Display,
        F: FnMut(&mut C, &S) -> Result<R, E>,
        D: TransientErrorDetector<E>,
    {
        self.ensure_no_user_transaction(context.in_transaction(), suspend::is_suspended())?;

        let mut execution = TransactionalExecution::new(
            state,
            TransactionOptions::default(),
            operation,
            None::<NoCommitVerifier<C, S, E>>,
        );
        self.drive_blocking(context, &mut execution)
    }

    /// A retrying strategy cannot replay work done in a transaction it did not open.
    fn ensure_no_user_transaction<E>(&self, in_transaction: bool, nested: bool) -> StrategyResult<(), E> {
        if in_transaction && !nested && self.retries_on_failure() {
            return Err(ExecutionError::ExistingTransaction);
        }
        Ok(())
    }

    fn drive_blocking<C, X>(&self, context: &mut C, execution: &mut X) -> StrategyResult<X::Output, X::Error>
    where
        X: BlockingExecution<C>,
        X::Error: fmt::Display,
        D: TransientErrorDetector<X::Error>,
    {
        if suspend::is_suspended() {
            debug!("nested execution, running once without retries");
            return execution.attempt(context).map_err(ExecutionError::Operation);
        }

        let mut tracker = RetryTracker::start();
        loop {
            let attempt = tracker.begin_attempt();

            let error = match suspend::suspended(|| execution.attempt(context)) {
                Ok(output) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(output);
                }
                Err(error) => error,
            };

            if execution.can_verify() && self.policy.should_verify_success_on(&error) {
                match suspend::suspended(|| execution.verify(context)) {
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
            self.sleeper.sleep(delay);
        }
    }
}
