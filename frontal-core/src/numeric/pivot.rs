//! Elimination strategies for the fully-summed part of a front.
//!
//! [`Posdef`] performs a blocked Cholesky factorization and fails on the
//! first non-positive pivot. [`Indefinite`] performs threshold partial
//! pivoting with 1x1 and 2x2 pivots restricted to fully-summed columns;
//! columns that fail the test are left in place and delayed to the parent.

use super::dense::{idx, panel_update, sym_get, sym_swap};
use super::front::Front;
use crate::error::{FactorError, FactorResult};
use crate::options::{FactorOptions, FactorStats};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Posdef {}
    impl Sealed for super::Indefinite {}
}

/// Outcome of eliminating one front.
#[derive(Debug, Default)]
pub struct Eliminated {
    /// Number of pivots taken (leading front rows, in pivot order).
    pub nelim: usize,
    /// D in the two-per-pivot layout; empty for LL^T.
    pub diag: Vec<f64>,
    /// Per-node counters.
    pub stats: FactorStats,
}

/// Pivoting strategy of a numeric factorization.
pub trait Pivoting: sealed::Sealed + Send + Sync + 'static {
    /// True for the LL^T strategy.
    const POSDEF: bool;

    /// Eliminate the fully-summed columns of `front`.
    ///
    /// Columns `nfs..m` receive no Schur update here; the caller applies it
    /// when the contribution block is formed.
    fn eliminate<const BLOCK_SIZE: usize>(
        front: &mut Front,
        is_root: bool,
        options: &FactorOptions,
    ) -> FactorResult<Eliminated>;
}

/// Positive-definite strategy (LL^T, no pivoting).
#[derive(Debug, Clone, Copy, Default)]
pub struct Posdef;

/// Symmetric indefinite strategy (LDL^T with 1x1 and 2x2 pivots).
#[derive(Debug, Clone, Copy, Default)]
pub struct Indefinite;

#[inline]
fn column_flops(m: usize, col: usize) -> u64 {
    let r = (m - col) as u64;
    (r - 1) + (r - 1) * r
}

impl Pivoting for Posdef {
    const POSDEF: bool = true;

    fn eliminate<const BLOCK_SIZE: usize>(
        front: &mut Front,
        _is_root: bool,
        _options: &FactorOptions,
    ) -> FactorResult<Eliminated> {
        let (m, nfs) = (front.m, front.nfs);
        let a = &mut front.data;
        let mut stats = FactorStats::default();

        for j0 in (0..nfs).step_by(BLOCK_SIZE.max(1)) {
            let j1 = (j0 + BLOCK_SIZE.max(1)).min(nfs);
            for j in j0..j1 {
                let d = a[idx(m, j, j)];
                if d <= 0.0 || !d.is_finite() {
                    return Err(FactorError::NotPositiveDefinite {
                        var: front.rows[j],
                        pivot: d,
                    });
                }
                let l = d.sqrt();
                a[idx(m, j, j)] = l;
                for v in &mut a[idx(m, j + 1, j)..idx(m, 0, j + 1)] {
                    *v /= l;
                }
                panel_update(a, m, m, j, j + 1, j + 1, j1);
                stats.num_flops += column_flops(m, j);
            }
            panel_update(a, m, m, j0, j1, j1, nfs);
        }

        stats.num_factor = factor_entries(m, nfs);
        Ok(Eliminated {
            nelim: nfs,
            diag: Vec::new(),
            stats,
        })
    }
}

fn factor_entries(m: usize, q: usize) -> u64 {
    let (m, q) = (m as u64, q as u64);
    q * (q + 1) / 2 + (m - q) * q
}

/// Pivot choice for the next elimination step.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pivot {
    /// Column is negligible everywhere
    Zero(usize),
    One(usize),
    Two(usize, usize),
}

/// Largest off-diagonal magnitude in column `c` over rows `q..m`, skipping `skip`.
fn colmax(a: &[f64], m: usize, q: usize, c: usize, skip: usize) -> f64 {
    (q..m)
        .filter(|&r| r != c && r != skip)
        .map(|r| sym_get(a, m, r, c).abs())
        .fold(0.0, f64::max)
}

/// `num / den`, with a zero denominator passing any threshold.
fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        f64::INFINITY
    } else {
        num / den
    }
}

fn consider(best: &mut Option<(f64, Pivot)>, score: f64, pivot: Pivot) {
    if best.map_or(true, |(s, _)| score > s) {
        *best = Some((score, pivot));
    }
}

/// Choose the next pivot among fully-summed columns `q..nfs`.
///
/// A candidate's score is the largest tolerance it passes: `|a_cc| / colmax`
/// for a 1x1 pivot, and for a 2x2 pivot `|det|` over the worst row of
/// `|D^{-1}| * colmax`. The first candidate scoring at least `u` is taken.
/// A root cannot delay, so there the best-scoring candidate is used when
/// none passes; a zero pivot is only recorded for a column that is tiny.
fn find_pivot(a: &[f64], m: usize, nfs: usize, q: usize, u: f64, small: f64, is_root: bool) -> Option<Pivot> {
    let mut best: Option<(f64, Pivot)> = None;
    let mut flattest: Option<(f64, usize)> = None;

    for c in q..nfs {
        let acc = a[idx(m, c, c)].abs();
        let cmax = colmax(a, m, q, c, c);
        if acc <= small && cmax <= small {
            return Some(Pivot::Zero(c));
        }
        if acc > small {
            let score = ratio(acc, cmax);
            if score >= u {
                return Some(Pivot::One(c));
            }
            consider(&mut best, score, Pivot::One(c));
        }
        if flattest.map_or(true, |(v, _)| cmax < v) {
            flattest = Some((cmax, c));
        }

        // Best 2x2 partner among the fully-summed columns
        let partner = (q..nfs)
            .filter(|&r| r != c)
            .map(|r| (r, sym_get(a, m, r, c).abs()))
            .fold(None, |best: Option<(usize, f64)>, (r, v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((r, v)),
            });
        let Some((p, apc)) = partner else { continue };
        if apc <= small {
            continue;
        }
        let app = a[idx(m, p, p)].abs();
        let det = (a[idx(m, c, c)] * a[idx(m, p, p)] - apc * apc).abs();
        if det <= small {
            continue;
        }
        let cmax_c = colmax(a, m, q, c, p);
        let cmax_p = colmax(a, m, q, p, c);
        let worst = (app * cmax_c + apc * cmax_p).max(apc * cmax_c + acc * cmax_p);
        let score = ratio(det, worst);
        if score >= u {
            return Some(Pivot::Two(c, p));
        }
        consider(&mut best, score, Pivot::Two(c, p));
    }

    if !is_root {
        return None;
    }
    best.map(|(_, pivot)| pivot)
        .or_else(|| flattest.map(|(_, c)| Pivot::Zero(c)))
}

/// Symmetric interchange of front rows `i` and `j`, keeping `rows` in sync.
fn swap(front: &mut Front, i: usize, j: usize) {
    if i == j {
        return;
    }
    let (lo, hi) = (i.min(j), i.max(j));
    sym_swap(&mut front.data, front.m, front.m, lo, hi);
    front.rows.swap(lo, hi);
}

fn eliminate_zero(a: &mut [f64], m: usize, q: usize) {
    a[idx(m, q, q)] = 1.0;
    for v in &mut a[idx(m, q + 1, q)..idx(m, 0, q + 1)] {
        *v = 0.0;
    }
}

fn eliminate_one(a: &mut [f64], m: usize, nfs: usize, q: usize) -> f64 {
    let d = a[idx(m, q, q)];
    let w: Vec<f64> = a[idx(m, q + 1, q)..idx(m, 0, q + 1)].to_vec();
    for (v, &wi) in a[idx(m, q + 1, q)..idx(m, 0, q + 1)].iter_mut().zip(&w) {
        *v = wi / d;
    }
    a[idx(m, q, q)] = 1.0;

    for c in q + 1..nfs {
        let wc = w[c - q - 1];
        if wc == 0.0 {
            continue;
        }
        for i in c..m {
            let li = a[idx(m, i, q)];
            a[idx(m, i, c)] -= li * wc;
        }
    }
    d
}

fn eliminate_two(a: &mut [f64], m: usize, nfs: usize, q: usize) -> (f64, f64, f64) {
    let (d11, d21, d22) = (a[idx(m, q, q)], a[idx(m, q + 1, q)], a[idx(m, q + 1, q + 1)]);
    let det = d11 * d22 - d21 * d21;
    let (i11, i21, i22) = (d22 / det, -d21 / det, d11 / det);

    let r0 = q + 2;
    let w1: Vec<f64> = a[idx(m, r0, q)..idx(m, 0, q + 1)].to_vec();
    let w2: Vec<f64> = a[idx(m, r0, q + 1)..idx(m, 0, q + 2)].to_vec();
    for t in 0..w1.len() {
        a[idx(m, r0 + t, q)] = w1[t] * i11 + w2[t] * i21;
        a[idx(m, r0 + t, q + 1)] = w1[t] * i21 + w2[t] * i22;
    }
    a[idx(m, q, q)] = 1.0;
    a[idx(m, q + 1, q)] = 0.0;
    a[idx(m, q + 1, q + 1)] = 1.0;

    for c in r0..nfs {
        let (w1c, w2c) = (w1[c - r0], w2[c - r0]);
        for i in c..m {
            let (l1, l2) = (a[idx(m, i, q)], a[idx(m, i, q + 1)]);
            a[idx(m, i, c)] -= l1 * w1c + l2 * w2c;
        }
    }
    (d11, d21, d22)
}

impl Pivoting for Indefinite {
    const POSDEF: bool = false;

    fn eliminate<const BLOCK_SIZE: usize>(
        front: &mut Front,
        is_root: bool,
        options: &FactorOptions,
    ) -> FactorResult<Eliminated> {
        let (m, nfs) = (front.m, front.nfs);
        let (u, small) = (options.u, options.small);

        let mut diag = Vec::with_capacity(2 * nfs);
        let mut stats = FactorStats::default();
        let mut q = 0;

        while q < nfs {
            let Some(pivot) = find_pivot(&front.data, m, nfs, q, u, small, is_root) else {
                break;
            };

            match pivot {
                Pivot::Zero(c) => {
                    if !options.action {
                        return Err(FactorError::Singular { var: front.rows[c] });
                    }
                    swap(front, q, c);
                    eliminate_zero(&mut front.data, m, q);
                    diag.extend_from_slice(&[0.0, 0.0]);
                    stats.num_zero += 1;
                    q += 1;
                }
                Pivot::One(c) => {
                    swap(front, q, c);
                    let d = eliminate_one(&mut front.data, m, nfs, q);
                    diag.extend_from_slice(&[d, 0.0]);
                    if d < 0.0 {
                        stats.num_neg += 1;
                    }
                    stats.num_flops += column_flops(m, q);
                    q += 1;
                }
                Pivot::Two(c, p) => {
                    swap(front, q, c);
                    // Moving c may have carried the partner along
                    let p = if p == q { c } else { p };
                    swap(front, q + 1, p);
                    let (d11, d21, d22) = eliminate_two(&mut front.data, m, nfs, q);
                    diag.extend_from_slice(&[d11, d21, d22, 0.0]);

                    let det = d11 * d22 - d21 * d21;
                    if det < 0.0 {
                        stats.num_neg += 1;
                    } else if d11 + d22 < 0.0 {
                        stats.num_neg += 2;
                    }
                    stats.num_two += 1;
                    stats.num_flops += column_flops(m, q) + column_flops(m, q + 1);
                    q += 2;
                }
            }
        }

        stats.num_delay = nfs - q;
        stats.num_factor = factor_entries(m, q);
        Ok(Eliminated {
            nelim: q,
            diag,
            stats,
        })
    }
}

/// Inverse of D in the two-per-pivot layout.
///
/// A nonzero off-diagonal at position `p` marks a 2x2 block on `p, p+1`.
/// Singular blocks get a zero inverse.
pub(crate) fn invert_d(diag: &[f64]) -> Vec<f64> {
    let q = diag.len() / 2;
    let mut dinv = vec![0.0; diag.len()];
    let mut p = 0;
    while p < q {
        let (d11, d21) = (diag[2 * p], diag[2 * p + 1]);
        if d21 != 0.0 && p + 1 < q {
            let d22 = diag[2 * p + 2];
            let det = d11 * d22 - d21 * d21;
            if det != 0.0 && det.is_finite() {
                dinv[2 * p] = d22 / det;
                dinv[2 * p + 1] = -d21 / det;
                dinv[2 * p + 2] = d11 / det;
            }
            p += 2;
        } else {
            if d11 != 0.0 {
                dinv[2 * p] = 1.0 / d11;
            }
            p += 1;
        }
    }
    dinv
}
