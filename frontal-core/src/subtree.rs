//! Runtime dispatch over the two standard engine instances.
//!
//! Callers that only learn at run time whether the matrix is positive
//! definite hold a [`Subtree`] and forward every operation through it.

use std::sync::Arc;

use crate::error::FactorResult;
use crate::numeric::{IndefSubtree, PosdefSubtree};
use crate::options::{FactorOptions, FactorStats};
use crate::symbolic::SymbolicFactor;

/// Numeric factorization selected by a runtime `posdef` flag.
pub enum Subtree {
    /// LL^T factorization
    Posdef(PosdefSubtree),
    /// LDL^T factorization
    Indef(IndefSubtree),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            Subtree::Posdef($inner) => $body,
            Subtree::Indef($inner) => $body,
        }
    };
}

impl Subtree {
    /// Factor `aval` with the engine chosen by `posdef`.
    pub fn create(
        posdef: bool,
        symbolic: Arc<SymbolicFactor>,
        aval: &[f64],
        scaling: Option<&[f64]>,
        options: &FactorOptions,
    ) -> FactorResult<Self> {
        if posdef {
            PosdefSubtree::factor(symbolic, aval, scaling, options).map(Subtree::Posdef)
        } else {
            IndefSubtree::factor(symbolic, aval, scaling, options).map(Subtree::Indef)
        }
    }

    pub fn is_posdef(&self) -> bool {
        matches!(self, Subtree::Posdef(_))
    }

    pub fn stats(&self) -> &FactorStats {
        dispatch!(self, s => s.stats())
    }

    pub fn symbolic(&self) -> &Arc<SymbolicFactor> {
        dispatch!(self, s => s.symbolic())
    }

    pub fn solve_fwd(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        dispatch!(self, s => s.solve_fwd(nrhs, x, ldx))
    }

    pub fn solve_diag(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        dispatch!(self, s => s.solve_diag(nrhs, x, ldx))
    }

    pub fn solve_diag_bwd(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        dispatch!(self, s => s.solve_diag_bwd(nrhs, x, ldx))
    }

    pub fn solve_bwd(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        dispatch!(self, s => s.solve_bwd(nrhs, x, ldx))
    }

    pub fn solve(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        dispatch!(self, s => s.solve(nrhs, x, ldx))
    }

    pub fn enquire(&self, piv_order: Option<&mut [usize]>, d: Option<&mut [f64]>) -> FactorResult<()> {
        dispatch!(self, s => s.enquire(piv_order, d))
    }

    pub fn alter(&mut self, d: &[f64]) -> FactorResult<()> {
        dispatch!(self, s => s.alter(d))
    }
}

impl std::fmt::Display for Subtree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        dispatch!(self, s => std::fmt::Display::fmt(s, f))
    }
}
