// ============================================================================
// MemoDB Resilience Library
// ============================================================================

pub mod core;
pub mod policy;
pub mod transaction;
pub mod strategy;
pub mod memory;

// Re-export main types for convenience
pub use crate::core::{ConfigError, ExecutionError, ExecutionResult, StrategyResult};
pub use policy::{
    ErrorKindDetector, NeverTransient, RetryConfig, TransientError, TransientErrorDetector,
};
pub use strategy::{ExecutionStrategy, RecordingSleeper, RetryEvent, Sleeper, ThreadSleeper};

// Re-export transaction API
pub use transaction::{
    AsyncTransactionScope, AsyncTransactionalContext, IsolationLevel, TransactionOptions,
    TransactionScope, TransactionalContext,
};

// Types that appear in async signatures
pub use futures::future::BoxFuture;
pub use tokio_util::sync::CancellationToken;

/// Commonly used items for callers of the execution strategy.
///
/// # Examples
///
/// ```
/// use memodb_resilience::prelude::*;
/// use memodb_resilience::memory::{FaultPlan, MemoryStore, StoreError};
/// use serde_json::json;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::with_faults(FaultPlan::new().lose_commit_acks(1));
/// let strategy = ExecutionStrategy::new(
///     RetryConfig::new().base_delay(std::time::Duration::ZERO),
///     MemoryStore::transient_detector(),
/// );
///
/// let mut session = store.session();
/// let id = strategy.execute_in_transaction(
///     &mut session,
///     "order-1".to_string(),
///     |session, key| -> Result<u32, StoreError> {
///         session.insert(key.as_str(), json!({ "total": 10 }))?;
///         Ok(1)
///     },
///     |session, key| Ok(session.get(key)?.is_some()),
/// )?;
///
/// // The commit landed even though its acknowledgement was lost.
/// assert_eq!(id, 1);
/// assert_eq!(store.stats().commits, 1);
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::core::{ExecutionError, ExecutionResult, StrategyResult};
    pub use crate::policy::{RetryConfig, TransientErrorDetector};
    pub use crate::strategy::ExecutionStrategy;
    pub use crate::transaction::{
        AsyncTransactionalContext, IsolationLevel, TransactionOptions, TransactionalContext,
    };
    pub use futures::future::BoxFuture;
    pub use tokio_util::sync::CancellationToken;
}
