//! Discriminated results for the callback calling convention.

use crate::error::{EngineError, EngineResult};

/// The result delivered to callback-convention callers.
///
/// Every boundary operation on a session or collection has two calling
/// conventions: a value-returning form (`Result`) and a callback form
/// receiving this two-shape discriminated result. Both share one
/// underlying mechanism - the callback adapters are thin wrappers over
/// the value form, never an independent code path.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation succeeded.
    Success(T),
    /// The operation failed.
    Error(EngineError),
}

impl<T> Outcome<T> {
    /// Returns `true` for a success outcome.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Converts back into a `Result`.
    pub fn into_result(self) -> EngineResult<T> {
        match self {
            Outcome::Success(data) => Ok(data),
            Outcome::Error(error) => Err(error),
        }
    }
}

impl<T> From<EngineResult<T>> for Outcome<T> {
    fn from(result: EngineResult<T>) -> Self {
        match result {
            Ok(data) => Outcome::Success(data),
            Err(error) => Outcome::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_result_roundtrip() {
        let ok: Outcome<i32> = Ok(5).into();
        assert!(ok.is_success());
        assert_eq!(ok.into_result().unwrap(), 5);

        let err: Outcome<i32> = Err(EngineError::RecordRemoved).into();
        assert!(!err.is_success());
        assert!(matches!(
            err.into_result(),
            Err(EngineError::RecordRemoved)
        ));
    }
}
