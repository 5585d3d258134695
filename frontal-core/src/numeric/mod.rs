//! Numeric multifrontal factorization.
//!
//! [`NumericSubtree`] factors the assembly tree of a [`SymbolicFactor`] as
//! a dependency graph on the rayon pool. Every leaf starts as its own task;
//! each node counts its unfinished children and the child that finishes
//! last spawns the parent, so independent subtrees never wait on each
//! other.
//!
//! Per node:
//! 1. Assemble the front from scaled original entries and child contributions
//! 2. Eliminate the fully-summed columns with the [`Pivoting`] strategy
//! 3. Store the factor columns and hand the Schur complement to the parent

mod dense;
mod front;
mod pivot;
mod pool;
mod solve;

pub use pivot::{Eliminated, Indefinite, Pivoting, Posdef};
pub use pool::{FrontAlloc, HeapAlloc, PoolAlloc};

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{check_len, FactorError, FactorResult};
use crate::options::{FactorOptions, FactorStats, StatusFlag};
use crate::symbolic::SymbolicFactor;
use dense::idx;
use front::{assemble, finish, Contribution};
use pivot::invert_d;

/// Panel width used by the standard engine instances.
pub const DEFAULT_BLOCK_SIZE: usize = 16;

/// Pool page size (in `f64` entries) used by the standard engine instances.
pub const DEFAULT_PAGE_SIZE: usize = 16384;

/// LL^T engine with the standard block size and pool allocator.
pub type PosdefSubtree = NumericSubtree<Posdef, DEFAULT_BLOCK_SIZE, PoolAlloc<DEFAULT_PAGE_SIZE>>;

/// LDL^T engine with the standard block size and pool allocator.
pub type IndefSubtree = NumericSubtree<Indefinite, DEFAULT_BLOCK_SIZE, PoolAlloc<DEFAULT_PAGE_SIZE>>;

/// Factor data of one node.
#[derive(Debug, Clone)]
pub struct NodeFactor {
    /// Original variables of the front rows; the first `nelim` were
    /// eliminated here, in pivot order
    pub(crate) rows: Vec<usize>,
    /// `m x nelim` column-major L block (unit diagonal for LDL^T, the
    /// Cholesky diagonal for LL^T)
    pub(crate) lcol: Vec<f64>,
    pub(crate) nelim: usize,
    /// D, two entries per pivot (LDL^T only)
    pub(crate) diag: Vec<f64>,
    /// D^{-1} in the same layout
    pub(crate) dinv: Vec<f64>,
}

impl NodeFactor {
    /// Original variables of the front rows.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Number of pivots taken at this node.
    pub fn nelim(&self) -> usize {
        self.nelim
    }

    /// Order of the front.
    pub fn nrow(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub(crate) fn l(&self, i: usize, p: usize) -> f64 {
        self.lcol[idx(self.rows.len(), i, p)]
    }
}

type NodeOutput = (NodeFactor, Option<Contribution>, FactorStats);

/// State shared by the node tasks of one tree factorization.
struct TreeTask<'a, A> {
    sfact: &'a SymbolicFactor,
    aval: &'a [f64],
    scaling: Option<&'a [f64]>,
    options: &'a FactorOptions,
    alloc: &'a A,
    /// Children of each node still being factored
    pending: Vec<AtomicUsize>,
    contribs: Vec<Mutex<Option<Contribution>>>,
    done: Vec<Mutex<Option<(NodeFactor, FactorStats)>>>,
    failed: Mutex<Vec<(usize, FactorError)>>,
}

/// Numeric factorization of a whole assembly tree.
///
/// Generic over the pivoting strategy, the panel width and the workspace
/// allocator. Several factorizations may share one symbolic factor.
pub struct NumericSubtree<P: Pivoting, const BLOCK_SIZE: usize, A: FrontAlloc> {
    symbolic: Arc<SymbolicFactor>,
    nodes: Vec<NodeFactor>,
    scaling: Option<Vec<f64>>,
    stats: FactorStats,
    _marker: PhantomData<fn() -> (P, A)>,
}

impl<P: Pivoting, const BLOCK_SIZE: usize, A: FrontAlloc> NumericSubtree<P, BLOCK_SIZE, A> {
    /// Factor the values `aval` (aligned with the analysed pattern).
    ///
    /// # Arguments
    ///
    /// * `symbolic` - Shared symbolic factor
    /// * `aval` - One value per pattern entry
    /// * `scaling` - Optional symmetric scaling `s`, factoring `S A S`
    /// * `options` - Pivoting and threading options
    pub fn factor(
        symbolic: Arc<SymbolicFactor>,
        aval: &[f64],
        scaling: Option<&[f64]>,
        options: &FactorOptions,
    ) -> FactorResult<Self> {
        options.validate()?;
        check_len("aval", symbolic.nnz(), aval.len())?;
        if let Some(s) = scaling {
            check_len("scaling", symbolic.n(), s.len())?;
        }

        let workspace = symbolic.max_workspace_size() as usize;
        let largest = symbolic.max_front_size();
        let alloc = A::reserve(workspace, largest * largest)?;
        let (nodes, mut stats) = if options.num_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.num_threads)
                .build()
                .map_err(|e| FactorError::ThreadPool(e.to_string()))?;
            pool.install(|| Self::factor_tree(&symbolic, aval, scaling, options, &alloc))?
        } else {
            Self::factor_tree(&symbolic, aval, scaling, options, &alloc)?
        };

        stats.memory_peak = alloc.peak();
        if stats.memory_peak > workspace {
            warn!(
                predicted = workspace,
                peak = stats.memory_peak,
                delays = stats.num_delay,
                "workspace peak exceeds sequential prediction"
            );
        }
        stats.flag = if stats.num_zero > 0 {
            StatusFlag::WarningSingular
        } else {
            StatusFlag::Success
        };
        if stats.num_factor > symbolic.nfact() {
            warn!(
                predicted = symbolic.nfact(),
                actual = stats.num_factor,
                "factor exceeds predicted size due to delayed pivots"
            );
        }
        debug!(posdef = P::POSDEF, %stats, "numeric factorization complete");

        let subtree = Self {
            symbolic,
            nodes,
            scaling: scaling.map(<[f64]>::to_vec),
            stats,
            _marker: PhantomData,
        };
        if options.dump_factors() {
            info!("{}", subtree);
        }
        Ok(subtree)
    }

    fn factor_tree(
        sfact: &SymbolicFactor,
        aval: &[f64],
        scaling: Option<&[f64]>,
        options: &FactorOptions,
        alloc: &A,
    ) -> FactorResult<(Vec<NodeFactor>, FactorStats)> {
        let nnodes = sfact.num_nodes();
        let task = TreeTask {
            sfact,
            aval,
            scaling,
            options,
            alloc,
            pending: (0..nnodes).map(|s| AtomicUsize::new(sfact.children(s).len())).collect(),
            contribs: (0..nnodes).map(|_| Mutex::new(None)).collect(),
            done: (0..nnodes).map(|_| Mutex::new(None)).collect(),
            failed: Mutex::new(Vec::new()),
        };

        rayon::scope(|scope| {
            let task = &task;
            for s in (0..nnodes).filter(|&s| sfact.children(s).is_empty()) {
                scope.spawn(move |scope| Self::run_node(scope, task, s));
            }
        });

        // A failed node never spawns its parent but its siblings still run,
        // so the lowest failing node does not depend on timing
        let mut failed = task.failed.into_inner();
        failed.sort_by_key(|&(s, _)| s);
        if let Some((s, err)) = failed.into_iter().next() {
            debug!(node = s, %err, "tree factorization aborted");
            return Err(err);
        }

        let mut stats = FactorStats::default();
        let mut nodes = Vec::with_capacity(nnodes);
        for (factor, node_stats) in task.done.into_iter().filter_map(|slot| slot.into_inner()) {
            stats.merge(&node_stats);
            nodes.push(factor);
        }
        Ok((nodes, stats))
    }

    /// Factor node `s` and, if it was the last child to finish, its parent.
    fn run_node<'s, 'a: 's>(scope: &rayon::Scope<'s>, task: &'s TreeTask<'a, A>, s: usize)
    where
        P: 's,
        A: 's,
    {
        let sfact = task.sfact;

        // Children are consumed in index order whatever order they finished in
        let kids: Vec<Contribution> = sfact
            .children(s)
            .iter()
            .filter_map(|&c| task.contribs[c].lock().take())
            .collect();

        match Self::factor_node(sfact, s, kids, task.aval, task.scaling, task.options, task.alloc) {
            Ok((factor, contrib, stats)) => {
                *task.done[s].lock() = Some((factor, stats));
                let parent = sfact.node(s).parent;
                if parent < sfact.num_nodes() {
                    *task.contribs[s].lock() = contrib;
                    if task.pending[parent].fetch_sub(1, Ordering::AcqRel) == 1 {
                        scope.spawn(move |scope| Self::run_node(scope, task, parent));
                    }
                }
            }
            Err(err) => {
                task.failed.lock().push((s, err));
            }
        }
    }

    fn factor_node(
        sfact: &SymbolicFactor,
        s: usize,
        kids: Vec<Contribution>,
        aval: &[f64],
        scaling: Option<&[f64]>,
        options: &FactorOptions,
        alloc: &A,
    ) -> FactorResult<NodeOutput> {
        let node = sfact.node(s);
        let is_root = node.parent >= sfact.num_nodes();

        let mut front = assemble(sfact, node, aval, scaling, kids, alloc)?;
        let (m, nfs) = (front.m, front.nfs);
        let elim = P::eliminate::<BLOCK_SIZE>(&mut front, is_root, options)?;
        trace!(node = s, m, nfs, nelim = elim.nelim, "node eliminated");

        let (ff, contrib) = finish::<BLOCK_SIZE, A>(front, s, elim.nelim, &elim.diag, is_root, alloc)?;
        let dinv = invert_d(&elim.diag);

        let mut stats = elim.stats;
        stats.maxfront = m;
        let factor = NodeFactor {
            rows: ff.rows,
            lcol: ff.lcol,
            nelim: elim.nelim,
            diag: elim.diag,
            dinv,
        };
        Ok((factor, contrib, stats))
    }

    /// Symbolic factor this factorization was built against.
    pub fn symbolic(&self) -> &Arc<SymbolicFactor> {
        &self.symbolic
    }

    /// Statistics gathered during factorization.
    pub fn stats(&self) -> &FactorStats {
        &self.stats
    }

    /// Per-node factor data in assembly order.
    pub fn node_factors(&self) -> &[NodeFactor] {
        &self.nodes
    }

    /// True for an LL^T factorization.
    pub fn is_posdef(&self) -> bool {
        P::POSDEF
    }

    /// Read back the pivot order and D.
    ///
    /// LDL^T: `piv_order[var]` is the position at which `var` was eliminated;
    /// `d[2p]` is the diagonal of D at position `p` and `d[2p+1]` the entry
    /// coupling `p` and `p+1`.
    ///
    /// 2x2 pivots are detected from `d`, not from `piv_order`: a 2x2 block
    /// always has a nonzero coupling entry, so `d[2p+1] != 0` means positions
    /// `p` and `p+1` form one block and `d[2p+3]` is zero. Every 1x1 pivot,
    /// zero pivots included, has `d[2p+1] == 0`.
    ///
    /// LL^T: `d[p]` is the diagonal of L at position `p`; `piv_order` is left
    /// untouched.
    pub fn enquire(&self, piv_order: Option<&mut [usize]>, d: Option<&mut [f64]>) -> FactorResult<()> {
        let n = self.symbolic.n();

        if P::POSDEF {
            if let Some(d) = d {
                check_min("d", n, d.len())?;
                let mut pos = 0;
                for nf in &self.nodes {
                    for p in 0..nf.nelim {
                        d[pos + p] = nf.l(p, p);
                    }
                    pos += nf.nelim;
                }
            }
            return Ok(());
        }

        if let Some(piv) = piv_order {
            check_min("piv_order", n, piv.len())?;
            let mut pos = 0;
            for nf in &self.nodes {
                for (p, &var) in nf.rows[..nf.nelim].iter().enumerate() {
                    piv[var] = pos + p;
                }
                pos += nf.nelim;
            }
        }
        if let Some(d) = d {
            check_min("d", 2 * n, d.len())?;
            let mut pos = 0;
            for nf in &self.nodes {
                d[2 * pos..2 * (pos + nf.nelim)].copy_from_slice(&nf.diag);
                pos += nf.nelim;
            }
        }
        Ok(())
    }

    /// Replace D (LDL^T only) and recompute its inverse.
    ///
    /// `d` uses the layout returned by [`NumericSubtree::enquire`].
    pub fn alter(&mut self, d: &[f64]) -> FactorResult<()> {
        if P::POSDEF {
            return Err(FactorError::NotLdlt);
        }
        check_min("d", 2 * self.symbolic.n(), d.len())?;

        let mut pos = 0;
        for nf in &mut self.nodes {
            let q = nf.nelim;
            nf.diag.copy_from_slice(&d[2 * pos..2 * (pos + q)]);
            nf.dinv = invert_d(&nf.diag);
            pos += q;
        }
        debug!(n = self.symbolic.n(), "D altered");
        Ok(())
    }
}

fn check_min(what: &'static str, expected: usize, actual: usize) -> FactorResult<()> {
    if actual < expected {
        return Err(FactorError::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

impl<P: Pivoting, const BLOCK_SIZE: usize, A: FrontAlloc> fmt::Display for NumericSubtree<P, BLOCK_SIZE, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if P::POSDEF { "LL^T" } else { "LDL^T" };
        writeln!(f, "{} factorization: n={} nodes={}", kind, self.symbolic.n(), self.nodes.len())?;
        for (s, nf) in self.nodes.iter().enumerate() {
            let m = nf.nrow();
            writeln!(f, "node {}: m={} nelim={} rows={:?}", s, m, nf.nelim, nf.rows)?;
            for i in 0..m {
                write!(f, "  L[{:>3}]", nf.rows[i])?;
                for p in 0..nf.nelim.min(i + 1) {
                    write!(f, " {:>12.4e}", nf.l(i, p))?;
                }
                writeln!(f)?;
            }
            if !P::POSDEF {
                write!(f, "  D")?;
                for pair in nf.diag.chunks(2) {
                    write!(f, " ({:.4e}, {:.4e})", pair[0], pair[1])?;
                }
                writeln!(f)?;
            }
        }
        write!(f, "stats: {}", self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::{from_triplets_lower, LowerCsc};

    fn tridiag(n: usize, diag: f64, off: f64) -> LowerCsc {
        let mut trip = Vec::new();
        for i in 0..n {
            trip.push((i, i, diag));
            if i + 1 < n {
                trip.push((i + 1, i, off));
            }
        }
        LowerCsc::from_sprs(&from_triplets_lower(n, trip))
    }

    fn opts() -> FactorOptions {
        FactorOptions::with_threads(2)
    }

    #[test]
    fn test_posdef_enquire_diagonal() {
        let a = tridiag(4, 4.0, -1.0);
        let sf = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, 1).unwrap());
        let num = PosdefSubtree::factor(sf, &a.val, None, &opts()).unwrap();
        assert!(num.is_posdef());

        let mut d = vec![0.0; 4];
        let mut piv = vec![usize::MAX; 4];
        num.enquire(Some(piv.as_mut_slice()), Some(d.as_mut_slice())).unwrap();
        assert_eq!(d[0], 2.0);
        assert!(d.iter().all(|&v| v > 0.0));
        assert!(piv.iter().all(|&p| p == usize::MAX));

        let mut num = num;
        assert_eq!(num.alter(&[0.0; 8]).unwrap_err(), FactorError::NotLdlt);
    }

    #[test]
    fn test_indefinite_stats_and_enquire() {
        // [[0, 1], [1, 0]]
        let a = LowerCsc::from_sprs(&from_triplets_lower(2, vec![(1, 0, 1.0)]));
        let sf = Arc::new(SymbolicFactor::new(2, &a.ptr, &a.row, 32).unwrap());
        let num = IndefSubtree::factor(sf, &a.val, None, &opts()).unwrap();

        let stats = num.stats();
        assert_eq!(stats.flag, StatusFlag::Success);
        assert_eq!(stats.num_two, 1);
        assert_eq!(stats.num_neg, 1);
        assert_eq!(stats.maxfront, 2);

        let mut piv = vec![0; 2];
        let mut d = vec![0.0; 4];
        num.enquire(Some(piv.as_mut_slice()), Some(d.as_mut_slice())).unwrap();
        assert_eq!(piv, vec![0, 1]);
        assert_eq!(d, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_dimension_checks() {
        let a = tridiag(3, 2.0, 1.0);
        let sf = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, 1).unwrap());

        let err = IndefSubtree::factor(sf.clone(), &a.val[..2], None, &opts()).err();
        assert!(matches!(err, Some(FactorError::DimensionMismatch { what: "aval", .. })));

        let err = IndefSubtree::factor(sf, &a.val, Some(&[1.0]), &opts()).err();
        assert!(matches!(err, Some(FactorError::DimensionMismatch { what: "scaling", .. })));
    }

    #[test]
    fn test_singular_flag() {
        // diag(1, 0): the zero pivot is accepted with a warning
        let a = LowerCsc {
            n: 2,
            ptr: vec![0, 1, 2],
            row: vec![0, 1],
            val: vec![1.0, 0.0],
        };
        let sf = Arc::new(SymbolicFactor::new(2, &a.ptr, &a.row, 1).unwrap());
        let num = IndefSubtree::factor(sf.clone(), &a.val, None, &opts()).unwrap();
        assert_eq!(num.stats().flag, StatusFlag::WarningSingular);
        assert_eq!(num.stats().num_zero, 1);

        let mut strict = opts();
        strict.action = false;
        let err = IndefSubtree::factor(sf, &a.val, None, &strict).err();
        assert_eq!(err, Some(FactorError::Singular { var: 1 }));
    }

    #[test]
    fn test_chain_peak_matches_prediction() {
        // A chain has one possible order, so the prediction is exact
        let a = tridiag(6, 4.0, -1.0);
        let sf = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, 1).unwrap());
        assert_eq!(sf.max_front_size(), 2);
        let predicted = sf.max_workspace_size() as usize;

        let pooled = IndefSubtree::factor(sf.clone(), &a.val, None, &FactorOptions::with_threads(1)).unwrap();
        assert_eq!(pooled.stats().memory_peak, predicted);
        let heap = NumericSubtree::<Indefinite, 4, HeapAlloc>::factor(sf, &a.val, None, &opts()).unwrap();
        assert_eq!(heap.stats().memory_peak, predicted);
    }

    #[test]
    fn test_failure_reports_lowest_node() {
        // Four independent roots, two of them not positive
        let a = LowerCsc {
            n: 4,
            ptr: vec![0, 1, 2, 3, 4],
            row: vec![0, 1, 2, 3],
            val: vec![1.0, -2.0, 3.0, -4.0],
        };
        let sf = Arc::new(SymbolicFactor::new(4, &a.ptr, &a.row, 1).unwrap());
        assert_eq!(sf.roots().count(), 4);
        for threads in [1, 4] {
            let err = PosdefSubtree::factor(sf.clone(), &a.val, None, &FactorOptions::with_threads(threads)).err();
            assert_eq!(err, Some(FactorError::NotPositiveDefinite { var: 1, pivot: -2.0 }));
        }
    }

    #[test]
    fn test_options_validated_before_factoring() {
        let a = tridiag(3, 2.0, -1.0);
        let sf = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, 1).unwrap());
        let mut bad = opts();
        bad.u = 0.9;
        let err = IndefSubtree::factor(sf, &a.val, None, &bad).err();
        assert!(matches!(err, Some(FactorError::InvalidOptions { name: "u", .. })));
    }

    #[test]
    fn test_display_dump() {
        let a = tridiag(3, 2.0, -1.0);
        let sf = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, 8).unwrap());
        let num = IndefSubtree::factor(sf, &a.val, None, &opts()).unwrap();
        let dump = num.to_string();
        assert!(dump.starts_with("LDL^T factorization: n=3"));
        assert!(dump.contains("node 0"));
        assert!(dump.contains("stats: flag=0"));
    }
}
