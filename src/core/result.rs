/// Outcome of a verification query run after an ambiguous failure.
///
/// A verifier either finds independent evidence that the work already took
/// effect (and hands back the value the caller should receive) or it does not,
/// in which case the failure is handled like any other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult<R> {
    /// The effect is durably present; `R` is returned to the caller.
    Succeeded(R),
    /// No evidence was found; the original failure stands.
    Unresolved,
}

impl<R> ExecutionResult<R> {
    /// Builds a result from the `(successful, result)` pair used by verifiers
    /// that compute both pieces separately.
    pub fn new(successful: bool, result: R) -> Self {
        if successful {
            Self::Succeeded(result)
        } else {
            Self::Unresolved
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn into_result(self) -> Option<R> {
        match self {
            Self::Succeeded(result) => Some(result),
            Self::Unresolved => None,
        }
    }
}

impl<R> From<Option<R>> for ExecutionResult<R> {
    fn from(value: Option<R>) -> Self {
        match value {
            Some(result) => Self::Succeeded(result),
            None => Self::Unresolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_discards_result_when_unsuccessful() {
        assert_eq!(ExecutionResult::new(true, 7), ExecutionResult::Succeeded(7));
        assert_eq!(ExecutionResult::new(false, 7), ExecutionResult::Unresolved);
        assert!(!ExecutionResult::<u8>::Unresolved.is_successful());
    }

    #[test]
    fn test_from_option() {
        let found: ExecutionResult<&str> = Some("row").into();
        assert_eq!(found.into_result(), Some("row"));

        let missing: ExecutionResult<&str> = None.into();
        assert!(missing.into_result().is_none());
    }
}
