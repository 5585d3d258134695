//! Triangular solves against a numeric factorization.
//!
//! Right-hand sides are stored column by column: column `c` occupies
//! `x[c * ldx .. c * ldx + n]` and is indexed by original variable. All
//! phases work in place.

use super::{FrontAlloc, NodeFactor, NumericSubtree, Pivoting};
use crate::error::{FactorError, FactorResult};

fn check_rhs(n: usize, nrhs: usize, x: &[f64], ldx: usize) -> FactorResult<()> {
    if nrhs == 0 {
        return Ok(());
    }
    if ldx < n {
        return Err(FactorError::DimensionMismatch {
            what: "ldx",
            expected: n,
            actual: ldx,
        });
    }
    let need = (nrhs - 1) * ldx + n;
    if x.len() < need {
        return Err(FactorError::DimensionMismatch {
            what: "x",
            expected: need,
            actual: x.len(),
        });
    }
    Ok(())
}

/// Apply D^{-1} to the pivots of one node.
fn apply_dinv(nf: &NodeFactor, x: &mut [f64]) {
    let q = nf.nelim;
    let mut p = 0;
    while p < q {
        let v1 = nf.rows[p];
        if nf.diag[2 * p + 1] != 0.0 && p + 1 < q {
            let v2 = nf.rows[p + 1];
            let (x1, x2) = (x[v1], x[v2]);
            let (i11, i21, i22) = (nf.dinv[2 * p], nf.dinv[2 * p + 1], nf.dinv[2 * p + 2]);
            x[v1] = i11 * x1 + i21 * x2;
            x[v2] = i21 * x1 + i22 * x2;
            p += 2;
        } else {
            x[v1] *= nf.dinv[2 * p];
            p += 1;
        }
    }
}

impl<P: Pivoting, const BLOCK_SIZE: usize, A: FrontAlloc> NumericSubtree<P, BLOCK_SIZE, A> {
    fn rhs_columns<'a>(&self, nrhs: usize, x: &'a mut [f64], ldx: usize) -> impl Iterator<Item = &'a mut [f64]> {
        let n = self.symbolic.n();
        x.chunks_mut(ldx.max(1)).take(nrhs).map(move |col| &mut col[..n])
    }

    fn apply_scaling(&self, x: &mut [f64]) {
        if let Some(s) = &self.scaling {
            for (v, &si) in x.iter_mut().zip(s) {
                *v *= si;
            }
        }
    }

    fn forward_node(nf: &NodeFactor, x: &mut [f64]) {
        let m = nf.nrow();
        for p in 0..nf.nelim {
            let vp = nf.rows[p];
            if P::POSDEF {
                x[vp] /= nf.l(p, p);
            }
            let xp = x[vp];
            if xp == 0.0 {
                continue;
            }
            for i in p + 1..m {
                x[nf.rows[i]] -= nf.l(i, p) * xp;
            }
        }
    }

    fn backward_node(nf: &NodeFactor, x: &mut [f64]) {
        let m = nf.nrow();
        for p in (0..nf.nelim).rev() {
            let mut acc = x[nf.rows[p]];
            for i in p + 1..m {
                acc -= nf.l(i, p) * x[nf.rows[i]];
            }
            if P::POSDEF {
                acc /= nf.l(p, p);
            }
            x[nf.rows[p]] = acc;
        }
    }

    /// Scale, then solve L y = b.
    pub fn solve_fwd(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        check_rhs(self.symbolic.n(), nrhs, x, ldx)?;
        for col in self.rhs_columns(nrhs, x, ldx) {
            self.apply_scaling(col);
            for nf in &self.nodes {
                Self::forward_node(nf, col);
            }
        }
        Ok(())
    }

    /// y <- D^{-1} y (no-op for LL^T).
    pub fn solve_diag(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        check_rhs(self.symbolic.n(), nrhs, x, ldx)?;
        if P::POSDEF {
            return Ok(());
        }
        for col in self.rhs_columns(nrhs, x, ldx) {
            for nf in &self.nodes {
                apply_dinv(nf, col);
            }
        }
        Ok(())
    }

    /// Fused D^{-1} and L^T solve, then unscale.
    ///
    /// Nodes are visited in reverse order; each applies D^{-1} to its own
    /// pivots before its backward substitution.
    pub fn solve_diag_bwd(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        check_rhs(self.symbolic.n(), nrhs, x, ldx)?;
        for col in self.rhs_columns(nrhs, x, ldx) {
            for nf in self.nodes.iter().rev() {
                if !P::POSDEF {
                    apply_dinv(nf, col);
                }
                Self::backward_node(nf, col);
            }
            self.apply_scaling(col);
        }
        Ok(())
    }

    /// Solve L^T x = y, then unscale.
    pub fn solve_bwd(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        check_rhs(self.symbolic.n(), nrhs, x, ldx)?;
        for col in self.rhs_columns(nrhs, x, ldx) {
            for nf in self.nodes.iter().rev() {
                Self::backward_node(nf, col);
            }
            self.apply_scaling(col);
        }
        Ok(())
    }

    /// Full solve A x = b: forward, diagonal and backward phases.
    pub fn solve(&self, nrhs: usize, x: &mut [f64], ldx: usize) -> FactorResult<()> {
        self.solve_fwd(nrhs, x, ldx)?;
        self.solve_diag(nrhs, x, ldx)?;
        self.solve_bwd(nrhs, x, ldx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::numeric::{IndefSubtree, PosdefSubtree};
    use crate::options::FactorOptions;
    use crate::sparse::{from_triplets_lower, relative_residual, sym_matvec, LowerCsc};
    use crate::symbolic::SymbolicFactor;

    fn arrow(n: usize) -> LowerCsc {
        let mut trip = vec![(0, 0, n as f64 + 1.0)];
        for i in 1..n {
            trip.push((i, 0, 1.0));
            trip.push((i, i, 2.0 + i as f64));
        }
        LowerCsc::from_sprs(&from_triplets_lower(n, trip))
    }

    #[test]
    fn test_phases_match_full_solve() {
        let a = arrow(6);
        let sf = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, 1).unwrap());
        let num = IndefSubtree::factor(sf, &a.val, None, &FactorOptions::with_threads(1)).unwrap();

        let x_true: Vec<f64> = (0..6).map(|i| i as f64 - 2.5).collect();
        let mut b = vec![0.0; 6];
        sym_matvec(&a, &x_true, &mut b);

        let mut x1 = b.clone();
        num.solve(1, &mut x1, 6).unwrap();

        let mut x2 = b.clone();
        num.solve_fwd(1, &mut x2, 6).unwrap();
        num.solve_diag_bwd(1, &mut x2, 6).unwrap();

        for i in 0..6 {
            assert!((x1[i] - x_true[i]).abs() < 1e-12);
            assert!((x1[i] - x2[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_multiple_rhs_with_padding() {
        let a = arrow(5);
        let sf = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, 1).unwrap());
        let num = PosdefSubtree::factor(sf, &a.val, None, &FactorOptions::with_threads(1)).unwrap();

        let ldx = 7;
        let mut x = vec![f64::NAN; 2 * ldx];
        let b0 = vec![1.0, 0.0, -1.0, 2.0, 0.5];
        let b1 = vec![0.0, 3.0, 0.0, 0.0, 1.0];
        x[..5].copy_from_slice(&b0);
        x[ldx..ldx + 5].copy_from_slice(&b1);

        num.solve(2, &mut x, ldx).unwrap();
        assert!(relative_residual(&a, &x[..5], &b0) < 1e-14);
        assert!(relative_residual(&a, &x[ldx..ldx + 5], &b1) < 1e-14);
        // Padding rows are left alone
        assert!(x[5].is_nan() && x[6].is_nan());
    }

    #[test]
    fn test_rhs_dimension_errors() {
        let a = arrow(3);
        let sf = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, 1).unwrap());
        let num = IndefSubtree::factor(sf, &a.val, None, &FactorOptions::with_threads(1)).unwrap();

        let mut x = vec![0.0; 5];
        assert!(num.solve(2, &mut x, 3).is_err());
        assert!(num.solve(1, &mut x, 2).is_err());
        assert!(num.solve(0, &mut x, 0).is_ok());
    }
}
