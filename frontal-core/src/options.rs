//! Factorization options and statistics.

use std::fmt;

use crate::error::{FactorError, FactorResult};

/// Default amalgamation threshold used by symbolic analysis.
pub const NEMIN_DEFAULT: usize = 32;

/// Print level above which the complete factor is dumped after factorization.
pub const PRINT_LEVEL_DUMP: i32 = 9999;

/// Options consumed by numeric factorization.
#[derive(Debug, Clone)]
pub struct FactorOptions {
    /// Verbosity. Values above [`PRINT_LEVEL_DUMP`] dump the final factors.
    pub print_level: i32,

    /// Continue past zero pivots (indefinite path). If false, a zero pivot
    /// aborts the factorization with [`FactorError::Singular`].
    pub action: bool,

    /// Relative pivot tolerance for threshold pivoting, in (0, 0.5].
    pub u: f64,

    /// Pivots with magnitude below this are treated as zero.
    pub small: f64,

    /// Worker threads for tree-parallel factorization (0 = rayon default).
    pub num_threads: usize,
}

impl Default for FactorOptions {
    fn default() -> Self {
        // Environment overrides, mainly for benchmarking and debugging runs
        let num_threads = std::env::var("FRONTAL_THREADS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let print_level = std::env::var("FRONTAL_PRINT_LEVEL")
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(0);
        let u = std::env::var("FRONTAL_PIVOT_U")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|u| *u > 0.0 && *u <= 0.5)
            .unwrap_or(0.01);

        Self {
            print_level,
            action: true,
            u,
            small: 1e-20,
            num_threads,
        }
    }
}

impl FactorOptions {
    /// Options with a fixed worker count, otherwise default.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Default::default()
        }
    }

    /// Reject a pivot tolerance outside (0, 0.5] or a negative zero threshold.
    ///
    /// Above 0.5 no 1x1 or 2x2 pivot is guaranteed to pass, so roots could
    /// not finish without falling back to unstable pivots.
    pub fn validate(&self) -> FactorResult<()> {
        if !(self.u > 0.0 && self.u <= 0.5) {
            return Err(FactorError::InvalidOptions {
                name: "u",
                value: self.u,
                reason: "must lie in (0, 0.5]",
            });
        }
        if !(self.small >= 0.0 && self.small.is_finite()) {
            return Err(FactorError::InvalidOptions {
                name: "small",
                value: self.small,
                reason: "must be finite and non-negative",
            });
        }
        Ok(())
    }

    /// Whether the final factors should be dumped.
    pub fn dump_factors(&self) -> bool {
        self.print_level > PRINT_LEVEL_DUMP
    }
}

/// Outcome flag of a factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFlag {
    /// Factorization completed without incident.
    #[default]
    Success,
    /// Completed, but zero pivots were accepted (matrix is singular).
    WarningSingular,
    /// Failed with the given status code.
    Error(i32),
}

impl StatusFlag {
    /// Integer code reported at the C boundary.
    pub fn code(self) -> i32 {
        match self {
            StatusFlag::Success => 0,
            StatusFlag::WarningSingular => 7,
            StatusFlag::Error(code) => code,
        }
    }

    /// True for success and warnings.
    pub fn is_ok(self) -> bool {
        !matches!(self, StatusFlag::Error(_))
    }
}

impl From<&FactorError> for StatusFlag {
    fn from(e: &FactorError) -> Self {
        StatusFlag::Error(e.code())
    }
}

/// Statistics gathered during numeric factorization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorStats {
    /// Outcome
    pub flag: StatusFlag,
    /// Number of pivots delayed to an ancestor (summed over nodes)
    pub num_delay: usize,
    /// Number of negative eigenvalues of D
    pub num_neg: usize,
    /// Number of 2x2 pivots
    pub num_two: usize,
    /// Number of zero pivots
    pub num_zero: usize,
    /// Largest front order
    pub maxfront: usize,
    /// Entries stored in L
    pub num_factor: u64,
    /// Floating-point operations performed in elimination
    pub num_flops: u64,
    /// Peak workspace entries held by the allocator
    pub memory_peak: usize,
}

impl FactorStats {
    /// Fold per-node counters into the running totals.
    pub(crate) fn merge(&mut self, other: &FactorStats) {
        self.num_delay += other.num_delay;
        self.num_neg += other.num_neg;
        self.num_two += other.num_two;
        self.num_zero += other.num_zero;
        self.maxfront = self.maxfront.max(other.maxfront);
        self.num_factor += other.num_factor;
        self.num_flops += other.num_flops;
    }
}

impl fmt::Display for FactorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flag={} delays={} neg={} two={} zero={} maxfront={} nfactor={} nflops={} peak={}",
            self.flag.code(),
            self.num_delay,
            self.num_neg,
            self.num_two,
            self.num_zero,
            self.maxfront,
            self.num_factor,
            self.num_flops,
            self.memory_peak
        )
    }
}
