//! Sparse matrix helpers for symmetric input in CSC format.
//!
//! The solver reads the lower triangle (`row >= col`) of a compressed-column
//! matrix. These helpers build such matrices from triplets with `sprs`, pull
//! out the raw `ptr/row/val` arrays the symbolic and numeric phases take, and
//! provide a symmetric matrix-vector product for residual checks.

use sprs::{CsMat, TriMat};

/// Sparse matrix in CSC format.
pub type SparseCsc = CsMat<f64>;

/// Raw compressed-column arrays of a symmetric matrix (lower triangle).
#[derive(Debug, Clone, PartialEq)]
pub struct LowerCsc {
    /// Matrix dimension
    pub n: usize,
    /// Column start offsets (length n+1)
    pub ptr: Vec<usize>,
    /// Row indices, `row >= col` within each column
    pub row: Vec<usize>,
    /// Values aligned with `row`
    pub val: Vec<f64>,
}

impl LowerCsc {
    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.row.len()
    }

    /// Extract the lower triangle of a square `sprs` matrix.
    ///
    /// Entries above the diagonal are dropped, so a fully stored symmetric
    /// matrix and its lower half give the same result.
    pub fn from_sprs(mat: &SparseCsc) -> Self {
        assert_eq!(mat.rows(), mat.cols(), "Symmetric matrix must be square");
        let csc = if mat.is_csc() { mat.clone() } else { mat.to_csc() };
        let n = csc.cols();

        let mut ptr = Vec::with_capacity(n + 1);
        let mut row = Vec::with_capacity(csc.nnz());
        let mut val = Vec::with_capacity(csc.nnz());
        ptr.push(0);
        for col in 0..n {
            if let Some(view) = csc.outer_view(col) {
                for (r, &v) in view.iter() {
                    if r >= col {
                        row.push(r);
                        val.push(v);
                    }
                }
            }
            ptr.push(row.len());
        }

        Self { n, ptr, row, val }
    }
}

/// Build a symmetric CSC matrix holding only the lower triangle.
///
/// Triplets may come from either triangle; `(i, j)` and `(j, i)` name the same
/// entry and duplicates are summed.
pub fn from_triplets_lower<I>(n: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((n, n));
    for (i, j, v) in triplets {
        let (r, c) = if i >= j { (i, j) } else { (j, i) };
        tri.add_triplet(r, c, v);
    }
    tri.to_csc()
}

/// Symmetric matrix-vector product y = A x from lower-triangle arrays.
pub fn sym_matvec(a: &LowerCsc, x: &[f64], y: &mut [f64]) {
    assert_eq!(x.len(), a.n);
    assert_eq!(y.len(), a.n);

    y.fill(0.0);
    for col in 0..a.n {
        for p in a.ptr[col]..a.ptr[col + 1] {
            let r = a.row[p];
            let v = a.val[p];
            y[r] += v * x[col];
            if r != col {
                y[col] += v * x[r];
            }
        }
    }
}

/// Infinity norm of A x - b, relative to ||A||_inf ||x||_inf + ||b||_inf.
pub fn relative_residual(a: &LowerCsc, x: &[f64], b: &[f64]) -> f64 {
    let mut ax = vec![0.0; a.n];
    sym_matvec(a, x, &mut ax);

    let resid = ax
        .iter()
        .zip(b.iter())
        .map(|(&l, &r)| (l - r).abs())
        .fold(0.0, f64::max);

    let mut row_sums = vec![0.0; a.n];
    for col in 0..a.n {
        for p in a.ptr[col]..a.ptr[col + 1] {
            let r = a.row[p];
            row_sums[r] += a.val[p].abs();
            if r != col {
                row_sums[col] += a.val[p].abs();
            }
        }
    }
    let a_norm = row_sums.into_iter().fold(0.0, f64::max);
    let x_norm = x.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let b_norm = b.iter().fold(0.0f64, |m, v| m.max(v.abs()));

    let denom = a_norm * x_norm + b_norm;
    if denom == 0.0 {
        resid
    } else {
        resid / denom
    }
}
