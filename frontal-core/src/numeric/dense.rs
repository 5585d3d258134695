//! Dense kernels on column-major frontal matrices.
//!
//! Fronts are square, column-major with leading dimension `ld`, and only the
//! lower triangle (`row >= col`) is meaningful.

/// Offset of entry (i, j) in a column-major buffer.
#[inline]
pub(crate) fn idx(ld: usize, i: usize, j: usize) -> usize {
    j * ld + i
}

/// Symmetric read from lower storage.
#[inline]
pub(crate) fn sym_get(a: &[f64], ld: usize, i: usize, j: usize) -> f64 {
    if i >= j {
        a[idx(ld, i, j)]
    } else {
        a[idx(ld, j, i)]
    }
}

/// Symmetric interchange of rows/columns `i < j` of an `m x m` lower matrix.
///
/// Columns left of `i` are treated as rows of a factor and swapped too.
pub(crate) fn sym_swap(a: &mut [f64], ld: usize, m: usize, i: usize, j: usize) {
    debug_assert!(i < j && j < m);
    for x in 0..i {
        a.swap(idx(ld, i, x), idx(ld, j, x));
    }
    a.swap(idx(ld, i, i), idx(ld, j, j));
    for x in i + 1..j {
        a.swap(idx(ld, x, i), idx(ld, j, x));
    }
    for x in j + 1..m {
        a.swap(idx(ld, x, i), idx(ld, x, j));
    }
}

/// Right-looking panel update within one buffer:
/// `a[i, c] -= sum_{p in k0..k1} a[i, p] * a[c, p]` for `c in c0..c1`, `i in c..m`.
///
/// Requires `k1 <= c0` so the panel and the target columns do not overlap.
pub(crate) fn panel_update(a: &mut [f64], ld: usize, m: usize, k0: usize, k1: usize, c0: usize, c1: usize) {
    debug_assert!(k1 <= c0);
    let (left, right) = a.split_at_mut(c0 * ld);
    for c in c0..c1 {
        let col = &mut right[(c - c0) * ld..(c - c0) * ld + m];
        for p in k0..k1 {
            let lp = &left[p * ld..p * ld + m];
            let lcp = lp[c];
            if lcp == 0.0 {
                continue;
            }
            for i in c..m {
                col[i] -= lp[i] * lcp;
            }
        }
    }
}

/// Tiled symmetric update `c[i, j] -= sum_p w[i, p] * l[j, p]` for `i >= j`.
///
/// `c` is `n x n` with leading dimension `ldc`; `w` and `l` are `n x k` with
/// leading dimensions `ldw` and `ldl`. The lower triangle is processed in
/// `BLOCK_SIZE x BLOCK_SIZE` tiles.
#[allow(clippy::too_many_arguments)]
pub(crate) fn schur_update<const BLOCK_SIZE: usize>(
    c: &mut [f64],
    ldc: usize,
    n: usize,
    w: &[f64],
    ldw: usize,
    l: &[f64],
    ldl: usize,
    k: usize,
) {
    let bs = BLOCK_SIZE.max(1);
    for jb in (0..n).step_by(bs) {
        let je = (jb + bs).min(n);
        for ib in (jb..n).step_by(bs) {
            let ie = (ib + bs).min(n);
            for p in 0..k {
                let wcol = &w[p * ldw..];
                let lcol = &l[p * ldl..];
                for j in jb..je {
                    let ljp = lcol[j];
                    if ljp == 0.0 {
                        continue;
                    }
                    let cj = &mut c[j * ldc..j * ldc + n];
                    for i in ib.max(j)..ie {
                        cj[i] -= wcol[i] * ljp;
                    }
                }
            }
        }
    }
}

/// Copy the lower triangle of the trailing block `a[off.., off..]` (order `n`)
/// into `out` with leading dimension `n`.
pub(crate) fn copy_trailing_lower(a: &[f64], ld: usize, off: usize, n: usize, out: &mut [f64]) {
    for j in 0..n {
        let src = idx(ld, off + j, off + j);
        let dst = idx(n, j, j);
        let len = n - j;
        out[dst..dst + len].copy_from_slice(&a[src..src + len]);
    }
}
