// Convenience shapes for callers without caller state, or without a context at all.
impl<D> ExecutionStrategy<D> {
    /// Executes `operation` on `context` with no caller state.
    pub fn run<C, R, E, F>(&self, context: &mut C, mut operation: F) -> StrategyResult<R, E>
    where
        F: FnMut(&mut C) -> Result<R, E>,
        E: fmt::Display,
        D: TransientErrorDetector<E>,
    {
        self.execute(context, (), move |context, _| operation(context))
    }

    /// Retries a self-contained closure.
    pub fn retry<R, E, F>(&self, mut operation: F) -> StrategyResult<R, E>
    where
        F: FnMut() -> Result<R, E>,
        E: fmt::Display,
        D: TransientErrorDetector<E>,
    {
        let mut context = ();
        self.run(&mut context, move |_| operation())
    }

    /// Transactional execution with no caller state.
    pub fn run_in_transaction<C, R, E, F, V>(
        &self,
        context: &mut C,
        mut operation: F,
        mut verify_succeeded: V,
    ) -> StrategyResult<R, E>
    where
        C: TransactionalContext,
        E: From<C::Error> + fmt::Display,
        F: FnMut(&mut C) -> Result<R, E>,
        V: FnMut(&mut C) -> Result<bool, E>,
        D: TransientErrorDetector<E>,
    {
        self.execute_in_transaction(
            context,
            (),
            move |context, _| operation(context),
            move |context, _| verify_succeeded(context),
        )
    }

    /// Async execution with no caller state.
    pub async fn run_async<C, R, E, F>(
        &self,
        context: &mut C,
        mut operation: F,
        token: &CancellationToken,
    ) -> StrategyResult<R, E>
    where
        C: Send,
        R: Send,
        E: fmt::Display + Send,
        F: for<'a> FnMut(&'a mut C, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>> + Send,
        D: TransientErrorDetector<E>,
    {
        self.execute_async(
            context,
            (),
            move |context, _, token| operation(context, token),
            token,
        )
        .await
    }

    /// Async transactional execution with no caller state.
    pub async fn run_in_transaction_async<C, R, E, F, V>(
        &self,
        context: &mut C,
        mut operation: F,
        mut verify_succeeded: V,
        token: &CancellationToken,
    ) -> StrategyResult<R, E>
    where
        C: AsyncTransactionalContext,
        R: Send,
        E: From<C::Error> + fmt::Display + Send,
        F: for<'a> FnMut(&'a mut C, &'a CancellationToken) -> BoxFuture<'a, Result<R, E>> + Send,
        V: for<'a> FnMut(&'a mut C, &'a CancellationToken) -> BoxFuture<'a, Result<bool, E>>
            + Send,
        D: TransientErrorDetector<E>,
    {
        self.execute_in_transaction_async(
            context,
            (),
            move |context, _, token| operation(context, token),
            move |context, _, token| verify_succeeded(context, token),
            token,
        )
        .await
    }

    /// Retries a self-contained async closure.
    ///
    /// The futures must own what they use (`'static`); share state with the
    /// closure through an `Arc`.
    pub async fn retry_async<R, E, F, Fut>(
        &self,
        mut operation: F,
        token: &CancellationToken,
    ) -> StrategyResult<R, E>
    where
        R: Send,
        E: fmt::Display + Send,
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<R, E>> + Send + 'static,
        D: TransientErrorDetector<E>,
    {
        let mut context = ();
        self.run_async(&mut context, move |_, _| Box::pin(operation()), token)
            .await
    }
}
