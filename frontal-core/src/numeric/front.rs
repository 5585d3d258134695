//! Frontal matrix assembly, extend-add and contribution extraction.
//!
//! A front for node `s` is laid out as
//! `[own variables | delayed variables from children | remaining rows]`,
//! where the first two groups are fully summed. Child contributions carry
//! their delayed variables first, followed by the child's symbolic rows
//! beyond its own.

use super::dense::{copy_trailing_lower, idx, schur_update};
use super::pool::FrontAlloc;
use crate::error::{FactorError, FactorResult};
use crate::symbolic::{Node, SymbolicFactor};

/// Dense front of one node during factorization.
#[derive(Debug)]
pub struct Front {
    /// Order of the front.
    pub(crate) m: usize,
    /// Number of fully-summed rows (own + delayed in).
    pub(crate) nfs: usize,
    /// Lower triangle, column-major with leading dimension `m`.
    pub(crate) data: Vec<f64>,
    /// Original variable of each front row, permuted along with pivoting.
    pub(crate) rows: Vec<usize>,
}

/// Schur complement handed from a node to its parent.
#[derive(Debug)]
pub(crate) struct Contribution {
    /// Node that produced this block
    pub node: usize,
    /// Original variables delayed to the parent (leading rows)
    pub delayed: Vec<usize>,
    /// Order of the block
    pub m: usize,
    /// Lower triangle, column-major with leading dimension `m`
    pub data: Vec<f64>,
}

/// Assemble a node's front from original values and child contributions.
///
/// Contributions are released back to the allocator once added.
pub(crate) fn assemble<A: FrontAlloc>(
    sfact: &SymbolicFactor,
    node: &Node,
    aval: &[f64],
    scaling: Option<&[f64]>,
    contribs: Vec<Contribution>,
    alloc: &A,
) -> FactorResult<Front> {
    let own = node.nelim();
    let ndelay_in: usize = contribs.iter().map(|c| c.delayed.len()).sum();
    let m = node.nrow() + ndelay_in;
    let nfs = own + ndelay_in;

    let invp = sfact.invp();
    let mut rows = Vec::with_capacity(m);
    rows.extend(node.rows[..own].iter().map(|&w| invp[w]));
    for cb in &contribs {
        rows.extend_from_slice(&cb.delayed);
    }
    rows.extend(node.rows[own..].iter().map(|&w| invp[w]));

    let mut data = alloc.acquire(m * m)?;

    // Original entries
    let local = |li: usize| if li < own { li } else { li + ndelay_in };
    for e in &node.amap {
        let (r, c) = (local(e.row), local(e.col));
        let mut v = aval[e.src];
        if let Some(s) = scaling {
            v *= s[rows[r]] * s[rows[c]];
        }
        data[idx(m, r, c)] += v;
    }

    // Extend-add in child order
    let mut delay_offset = own;
    let mut map = Vec::new();
    for cb in contribs {
        let child = sfact.node(cb.node);
        map.clear();
        map.extend(delay_offset..delay_offset + cb.delayed.len());
        delay_offset += cb.delayed.len();

        let mut k = 0;
        for &w in &child.rows[child.nelim()..] {
            while node.rows[k] < w {
                k += 1;
            }
            debug_assert_eq!(node.rows[k], w);
            map.push(local(k));
        }
        debug_assert_eq!(map.len(), cb.m);

        for j in 0..cb.m {
            let fj = map[j];
            for i in j..cb.m {
                let v = cb.data[idx(cb.m, i, j)];
                if v == 0.0 {
                    continue;
                }
                let fi = map[i];
                let (r, c) = if fi >= fj { (fi, fj) } else { (fj, fi) };
                data[idx(m, r, c)] += v;
            }
        }
        alloc.release(cb.data);
    }

    Ok(Front { m, nfs, data, rows })
}

/// Eliminated columns of a front, ready to be stored.
#[derive(Debug)]
pub(crate) struct FrontFactor {
    /// Front rows in final pivot order
    pub rows: Vec<usize>,
    /// `m x nelim` column-major L block
    pub lcol: Vec<f64>,
}

fn alloc_factor(len: usize) -> FactorResult<Vec<f64>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| FactorError::AllocationFailed { requested: len })?;
    Ok(buf)
}

/// Split an eliminated front into its factor columns and the contribution
/// block for the parent, then release the front.
///
/// `diag` holds D in the two-per-pivot layout (empty for LL^T). The Schur
/// update of the non-fully-summed block is applied here, in tiles.
pub(crate) fn finish<const BLOCK_SIZE: usize, A: FrontAlloc>(
    front: Front,
    node_idx: usize,
    nelim: usize,
    diag: &[f64],
    is_root: bool,
    alloc: &A,
) -> FactorResult<(FrontFactor, Option<Contribution>)> {
    let Front { m, nfs, data, rows } = front;
    let q = nelim;

    let mut lcol = alloc_factor(m * q)?;
    lcol.extend_from_slice(&data[..m * q]);

    let contrib = if is_root || m == q {
        None
    } else {
        let mc = m - q;
        let mut cb = alloc.acquire(mc * mc)?;
        copy_trailing_lower(&data, m, q, mc, &mut cb);

        let ns = m - nfs;
        if ns > 0 && q > 0 {
            let off = nfs - q;
            let c = &mut cb[idx(mc, off, off)..];
            if diag.is_empty() {
                schur_update::<BLOCK_SIZE>(c, mc, ns, &lcol[nfs..], m, &lcol[nfs..], m, q);
            } else {
                let w = times_d(&lcol, m, nfs, q, diag);
                schur_update::<BLOCK_SIZE>(c, mc, ns, &w, ns, &lcol[nfs..], m, q);
            }
        }

        Some(Contribution {
            node: node_idx,
            delayed: rows[q..nfs].to_vec(),
            m: mc,
            data: cb,
        })
    };
    alloc.release(data);

    Ok((FrontFactor { rows, lcol }, contrib))
}

/// W = L D for rows `r0..m` of L (`m x q`, leading dimension `m`).
fn times_d(l: &[f64], m: usize, r0: usize, q: usize, diag: &[f64]) -> Vec<f64> {
    let nr = m - r0;
    let mut w = vec![0.0; nr * q];
    let mut p = 0;
    while p < q {
        let (d11, d21) = (diag[2 * p], diag[2 * p + 1]);
        if d21 != 0.0 && p + 1 < q {
            let d22 = diag[2 * p + 2];
            for i in 0..nr {
                let (l1, l2) = (l[idx(m, r0 + i, p)], l[idx(m, r0 + i, p + 1)]);
                w[idx(nr, i, p)] = l1 * d11 + l2 * d21;
                w[idx(nr, i, p + 1)] = l1 * d21 + l2 * d22;
            }
            p += 2;
        } else {
            for i in 0..nr {
                w[idx(nr, i, p)] = l[idx(m, r0 + i, p)] * d11;
            }
            p += 1;
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::pool::HeapAlloc;

    #[test]
    fn test_assemble_and_extend_add() {
        // Tridiagonal 3x3 with nemin 1: nodes {0}, {1, 2}
        let ptr = vec![0, 2, 4, 5];
        let row = vec![0, 1, 1, 2, 2];
        let aval = vec![4.0, -1.0, 4.0, -1.0, 4.0];
        let sf = SymbolicFactor::new(3, &ptr, &row, 1).unwrap();
        assert_eq!(sf.num_nodes(), 2);
        let alloc = HeapAlloc::default();

        let leaf = sf.node(0);
        let front = assemble(&sf, leaf, &aval, None, Vec::new(), &alloc).unwrap();
        assert_eq!((front.m, front.nfs), (2, 1));
        assert_eq!(front.data, vec![4.0, -1.0, 0.0, 0.0]);

        // Eliminate by hand: l = -1/4, contribution -1/4
        let mut front = front;
        front.data[1] = -0.25;
        front.data[0] = 1.0;
        let (factor, cb) = finish::<4, _>(front, 0, 1, &[4.0, 0.0], false, &alloc).unwrap();
        assert_eq!(factor.lcol, vec![1.0, -0.25]);
        let cb = cb.unwrap();
        assert_eq!(cb.m, 1);
        assert!(cb.delayed.is_empty());
        assert!((cb.data[0] + 0.25).abs() < 1e-15);

        let root = sf.node(1);
        let front = assemble(&sf, root, &aval, None, vec![cb], &alloc).unwrap();
        assert_eq!((front.m, front.nfs), (2, 2));
        assert!((front.data[0] - 3.75).abs() < 1e-15);
        assert_eq!(front.data[1], -1.0);
        assert_eq!(front.data[3], 4.0);
    }

    #[test]
    fn test_scaled_assembly() {
        let ptr = vec![0, 2, 3];
        let row = vec![0, 1, 1];
        let aval = vec![2.0, 1.0, 8.0];
        let sf = SymbolicFactor::new(2, &ptr, &row, 8).unwrap();
        let alloc = HeapAlloc::default();
        let scaling = vec![0.5, 0.25];

        let front = assemble(&sf, sf.node(0), &aval, Some(&scaling), Vec::new(), &alloc).unwrap();
        assert_eq!(front.data[0], 0.5);
        assert_eq!(front.data[1], 0.125);
        assert_eq!(front.data[3], 0.5);
    }
}
