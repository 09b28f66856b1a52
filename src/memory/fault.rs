use super::StoreError;
use std::collections::VecDeque;

/// What happens to a commit picked by the fault plan.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitFault {
    /// The commit is refused and nothing is applied.
    Reject(StoreError),
    /// The commit is applied but the caller is told it failed.
    LoseAck,
}

/// Scripted failures consumed in order by a [`MemoryStore`](super::MemoryStore).
///
/// # Examples
///
/// ```
/// use memodb_resilience::memory::{FaultPlan, MemoryStore, StoreError};
///
/// let plan = FaultPlan::new()
///     .fail_operations(2, StoreError::Timeout("injected".into()))
///     .lose_commit_acks(1);
/// let store = MemoryStore::with_faults(plan);
/// assert_eq!(store.pending_faults(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    operations: VecDeque<StoreError>,
    commits: VecDeque<CommitFault>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` reads or writes with `error`.
    pub fn fail_operations(mut self, count: usize, error: StoreError) -> Self {
        self.operations.extend(std::iter::repeat_n(error, count));
        self
    }

    /// Refuse the next `count` transaction commits with `error`, applying nothing.
    ///
    /// Writes made outside a transaction never consume commit faults.
    pub fn fail_commits(mut self, count: usize, error: StoreError) -> Self {
        self.commits
            .extend(std::iter::repeat_n(CommitFault::Reject(error), count));
        self
    }

    /// Apply the next `count` transaction commits but report them as failed.
    pub fn lose_commit_acks(mut self, count: usize) -> Self {
        self.commits
            .extend(std::iter::repeat_n(CommitFault::LoseAck, count));
        self
    }

    pub(crate) fn next_operation_fault(&mut self) -> Option<StoreError> {
        self.operations.pop_front()
    }

    pub(crate) fn next_commit_fault(&mut self) -> Option<CommitFault> {
        self.commits.pop_front()
    }

    /// Number of faults not yet triggered.
    pub fn len(&self) -> usize {
        self.operations.len() + self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_are_consumed_in_order() {
        let mut plan = FaultPlan::new()
            .fail_commits(1, StoreError::ConnectionLost("reset".into()))
            .lose_commit_acks(1);

        assert_eq!(plan.len(), 2);
        assert!(matches!(plan.next_commit_fault(), Some(CommitFault::Reject(_))));
        assert_eq!(plan.next_commit_fault(), Some(CommitFault::LoseAck));
        assert_eq!(plan.next_commit_fault(), None);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_zero_count_adds_nothing() {
        let plan = FaultPlan::new().fail_operations(0, StoreError::Timeout("t".into()));
        assert!(plan.is_empty());
    }
}
