//! Error types for symbolic analysis, factorization and solve.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type FactorResult<T> = Result<T, FactorError>;

/// Errors raised by the solver core.
///
/// Every variant maps to a stable integer status code (see [`FactorError::code`])
/// that the C boundary reports through its stats record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactorError {
    /// Sparsity pattern is malformed (pointer array, row index or order vector).
    #[error("Invalid sparsity pattern: {0}")]
    InvalidPattern(String),

    /// An input array has the wrong length.
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which input was checked
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// A non-positive pivot was met on the positive-definite path.
    #[error("Matrix is not positive definite: pivot for variable {var} is {pivot:e}")]
    NotPositiveDefinite {
        /// Original index of the offending variable
        var: usize,
        /// Pivot value before the square root
        pivot: f64,
    },

    /// A zero pivot was met and the options forbid continuing.
    #[error("Matrix is singular: zero pivot for variable {var}")]
    Singular {
        /// Original index of the offending variable
        var: usize,
    },

    /// A factorization option is outside its valid range.
    #[error("Invalid option {name} = {value:e}: {reason}")]
    InvalidOptions {
        /// Option name
        name: &'static str,
        /// Rejected value
        value: f64,
        /// Accepted range
        reason: &'static str,
    },

    /// Diagonal alteration requested on an LL^T factorization.
    #[error("Operation requires an LDL^T factorization")]
    NotLdlt,

    /// Memory for a front, contribution block or factor could not be obtained.
    #[error("Allocation of {requested} entries failed")]
    AllocationFailed {
        /// Number of f64 entries requested
        requested: usize,
    },

    /// The worker pool could not be built.
    #[error("Thread pool construction failed: {0}")]
    ThreadPool(String),
}

impl FactorError {
    /// Status code reported at the C boundary.
    pub fn code(&self) -> i32 {
        match self {
            FactorError::InvalidPattern(_) => -4,
            FactorError::Singular { .. } => -5,
            FactorError::NotPositiveDefinite { .. } => -6,
            FactorError::NotLdlt => -14,
            FactorError::DimensionMismatch { .. } => -15,
            FactorError::InvalidOptions { .. } => -16,
            FactorError::AllocationFailed { .. } => -50,
            FactorError::ThreadPool(_) => -51,
        }
    }
}

/// Check that `actual == expected`, naming the input on failure.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> FactorResult<()> {
    if expected != actual {
        return Err(FactorError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errs = [
            FactorError::InvalidPattern("x".into()),
            FactorError::Singular { var: 0 },
            FactorError::NotPositiveDefinite { var: 0, pivot: -1.0 },
            FactorError::NotLdlt,
            FactorError::DimensionMismatch {
                what: "aval",
                expected: 1,
                actual: 2,
            },
            FactorError::InvalidOptions {
                name: "u",
                value: 2.0,
                reason: "must lie in (0, 0.5]",
            },
            FactorError::AllocationFailed { requested: 8 },
            FactorError::ThreadPool("x".into()),
        ];
        let mut codes: Vec<i32> = errs.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
        assert!(codes.iter().all(|&c| c < 0));
    }

    #[test]
    fn test_check_len() {
        assert!(check_len("scaling", 3, 3).is_ok());
        let err = check_len("scaling", 3, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Dimension mismatch for scaling: expected 3, got 2"
        );
    }
}
