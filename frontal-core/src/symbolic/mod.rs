//! Symbolic analysis for multifrontal LDL^T / LL^T factorization.
//!
//! This module implements the analysis phase that runs before any
//! floating-point work:
//! - Elimination tree construction in the given elimination order
//! - Postorder and exact column counts
//! - Fundamental supernodes and `nemin` amalgamation
//! - Row structure and assembly maps for every node
//! - Factor storage, largest front and peak workspace prediction

mod amalgamate;
mod etree;

use tracing::{debug, warn};

use crate::error::FactorResult;
use amalgamate::amalgamate;
use etree::{build_graph, column_counts, elimination_tree, postorder, validate_order, validate_pattern};

/// Original entry assembled into a node's front.
///
/// `row >= col` are local indices into the node's row list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AssemblyEntry {
    /// Index into the value array
    pub src: usize,
    pub row: usize,
    pub col: usize,
}

/// A supernode of the assembly tree.
#[derive(Debug, Clone)]
pub struct Node {
    /// Index of this node in the node list.
    pub idx: usize,

    /// Parent node index; a value >= the node count marks a root.
    pub parent: usize,

    /// First elimination position eliminated here.
    pub sn_start: usize,

    /// One past the last elimination position eliminated here.
    pub sn_end: usize,

    /// Row structure in elimination positions (sorted). The first
    /// `nelim()` rows are the node's own variables.
    pub rows: Vec<usize>,

    /// Child node indices (increasing).
    pub children: Vec<usize>,

    pub(crate) amap: Vec<AssemblyEntry>,
}

impl Node {
    /// Number of variables eliminated at this node.
    pub fn nelim(&self) -> usize {
        self.sn_end - self.sn_start
    }

    /// Number of rows in the front.
    pub fn nrow(&self) -> usize {
        self.rows.len()
    }

    /// Parent index (>= node count for a root).
    pub fn parent_node_idx(&self) -> usize {
        self.parent
    }
}

/// Symbolic factorization: assembly tree, permutation and size predictions.
#[derive(Debug, Clone)]
pub struct SymbolicFactor {
    n: usize,
    nnz: usize,
    nemin: usize,
    /// perm[var] = elimination position of var
    perm: Vec<usize>,
    /// invp[pos] = variable eliminated at pos
    invp: Vec<usize>,
    nodes: Vec<Node>,
    factor_mem_size: u64,
    max_front: usize,
    max_workspace_size: u64,
    nfact: u64,
    nflop: u64,
    num_ignored: usize,
}

impl SymbolicFactor {
    /// Analyse the lower triangle of a symmetric pattern in natural order.
    ///
    /// # Arguments
    ///
    /// * `n` - Matrix dimension
    /// * `ptr` - Column start offsets (length n+1)
    /// * `row` - Row indices; entries with `row < col` are ignored
    /// * `nemin` - Amalgamation threshold
    pub fn new(n: usize, ptr: &[usize], row: &[usize], nemin: usize) -> FactorResult<Self> {
        validate_pattern(n, ptr, row)?;
        let order: Vec<usize> = (0..n).collect();
        Ok(Self::analyse(n, ptr, row, &order, nemin))
    }

    /// Analyse with a caller-supplied elimination order.
    ///
    /// `order[i]` is the position at which variable `i` is to be eliminated
    /// (before postordering and amalgamation refine it).
    pub fn with_order(
        n: usize,
        ptr: &[usize],
        row: &[usize],
        order: &[usize],
        nemin: usize,
    ) -> FactorResult<Self> {
        validate_pattern(n, ptr, row)?;
        validate_order(n, order)?;
        Ok(Self::analyse(n, ptr, row, order, nemin))
    }

    fn analyse(n: usize, ptr: &[usize], row: &[usize], order: &[usize], nemin: usize) -> Self {
        let (graph, num_ignored) = build_graph(n, ptr, row, order);
        if num_ignored > 0 {
            warn!(num_ignored, "upper-triangle entries ignored in symmetric pattern");
        }

        // Step 1: elimination tree and its postorder
        let etree = elimination_tree(&graph);
        let counts = column_counts(&graph, &etree);
        let post = postorder(&etree);

        let mut label = vec![0usize; n];
        for (t, &p) in post.iter().enumerate() {
            label[p] = t;
        }
        let parent_post: Vec<usize> = post
            .iter()
            .map(|&p| if etree[p] < n { label[etree[p]] } else { n })
            .collect();
        let counts_post: Vec<usize> = post.iter().map(|&p| counts[p]).collect();

        // Step 2: supernodes and amalgamation
        let amalg = amalgamate(&parent_post, &counts_post, nemin);
        let nnodes = amalg.num_nodes();

        // Step 3: final elimination positions, contiguous per node
        let mut inv_order = vec![0usize; n];
        for (var, &p) in order.iter().enumerate() {
            inv_order[p] = var;
        }
        let mut perm = vec![0usize; n];
        let mut invp = vec![0usize; n];
        let mut node_of = vec![0usize; n];
        let mut ranges = Vec::with_capacity(nnodes);
        let mut next = 0usize;
        for (s, labels) in amalg.members.iter().enumerate() {
            let start = next;
            for &t in labels {
                let var = inv_order[post[t]];
                perm[var] = next;
                invp[next] = var;
                node_of[next] = s;
                next += 1;
            }
            ranges.push((start, next));
        }

        // Step 4: later neighbours and original entries bucketed by owner node
        let nnz = row.len();
        let mut later_ptr = vec![0usize; n + 1];
        let mut entry_ptr = vec![0usize; nnodes + 1];
        for col in 0..n {
            for &r in &row[ptr[col]..ptr[col + 1]] {
                if r < col {
                    continue;
                }
                let lo = perm[r].min(perm[col]);
                if r != col {
                    later_ptr[lo + 1] += 1;
                }
                entry_ptr[node_of[lo] + 1] += 1;
            }
        }
        for k in 0..n {
            later_ptr[k + 1] += later_ptr[k];
        }
        for s in 0..nnodes {
            entry_ptr[s + 1] += entry_ptr[s];
        }

        let mut later = vec![0usize; later_ptr[n]];
        let mut entries = vec![(0usize, 0usize, 0usize); entry_ptr[nnodes]];
        let mut later_next = later_ptr.clone();
        let mut entry_next = entry_ptr.clone();
        for col in 0..n {
            for p in ptr[col]..ptr[col + 1] {
                let r = row[p];
                if r < col {
                    continue;
                }
                let (a, b) = (perm[r], perm[col]);
                let (lo, hi) = (a.min(b), a.max(b));
                if r != col {
                    later[later_next[lo]] = hi;
                    later_next[lo] += 1;
                }
                let s = node_of[lo];
                entries[entry_next[s]] = (p, hi, lo);
                entry_next[s] += 1;
            }
        }

        // Step 5: row structures, assembly maps and size predictions in one
        // postorder sweep
        let mut children = vec![Vec::new(); nnodes];
        for (s, &p) in amalg.parent.iter().enumerate() {
            if p < nnodes {
                children[p].push(s);
            }
        }

        let mut stamp = vec![usize::MAX; n];
        let mut local = vec![0usize; n];
        let mut nodes: Vec<Node> = Vec::with_capacity(nnodes);

        let mut factor_mem_size = 0u64;
        let mut nflop = 0u64;
        let mut stack = 0u64;
        let mut max_workspace_size = 0u64;
        let mut max_front = 0usize;

        for s in 0..nnodes {
            let (sn_start, sn_end) = ranges[s];
            let mut rows: Vec<usize> = (sn_start..sn_end).collect();
            for pos in sn_start..sn_end {
                stamp[pos] = s;
            }
            for pos in sn_start..sn_end {
                for &w in &later[later_ptr[pos]..later_ptr[pos + 1]] {
                    if stamp[w] != s {
                        stamp[w] = s;
                        rows.push(w);
                    }
                }
            }
            for &c in &children[s] {
                let child: &Node = &nodes[c];
                for &w in &child.rows[child.nelim()..] {
                    if stamp[w] != s {
                        stamp[w] = s;
                        rows.push(w);
                    }
                }
            }
            let nelim = sn_end - sn_start;
            rows[nelim..].sort_unstable();
            for (i, &w) in rows.iter().enumerate() {
                local[w] = i;
            }

            let amap = entries[entry_ptr[s]..entry_ptr[s + 1]]
                .iter()
                .map(|&(src, hi, lo)| AssemblyEntry {
                    src,
                    row: local[hi],
                    col: local[lo],
                })
                .collect();

            max_front = max_front.max(rows.len());
            let m = rows.len() as u64;
            let k = nelim as u64;
            factor_mem_size += k * (k + 1) / 2 + (m - k) * k;
            for t in 0..k {
                let r = m - t;
                nflop += (r - 1) + (r - 1) * r;
            }

            // Contribution stack as a sequential postorder factorization sees it
            let freed: u64 = children[s]
                .iter()
                .map(|&c| {
                    let cn = &nodes[c];
                    let cb = (cn.nrow() - cn.nelim()) as u64;
                    cb * cb
                })
                .sum();
            let own_cb = if amalg.parent[s] < nnodes { (m - k) * (m - k) } else { 0 };
            max_workspace_size = max_workspace_size.max(stack + m * m);
            stack -= freed;
            max_workspace_size = max_workspace_size.max(stack + m * m + own_cb);
            stack += own_cb;

            nodes.push(Node {
                idx: s,
                parent: amalg.parent[s],
                sn_start,
                sn_end,
                rows,
                children: children[s].clone(),
                amap,
            });
        }

        debug!(
            n,
            nnz,
            nemin,
            nnodes,
            max_front,
            factor_mem_size,
            max_workspace_size,
            nflop,
            "symbolic analysis complete"
        );

        Self {
            n,
            nnz,
            nemin,
            perm,
            invp,
            nodes,
            factor_mem_size,
            max_front,
            max_workspace_size,
            nfact: factor_mem_size,
            nflop,
            num_ignored,
        }
    }

    /// Matrix dimension.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of entries in the analysed pattern (length of the value array).
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Amalgamation threshold used.
    pub fn nemin(&self) -> usize {
        self.nemin
    }

    /// Elimination position of every original variable.
    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    /// Original variable eliminated at every position.
    pub fn invp(&self) -> &[usize] {
        &self.invp
    }

    /// Length of factor storage to allocate.
    pub fn factor_mem_size(&self) -> u64 {
        self.factor_mem_size
    }

    /// Order of the largest front, ignoring delayed pivots.
    pub fn max_front_size(&self) -> usize {
        self.max_front
    }

    /// Peak workspace of a sequential postorder factorization.
    pub fn max_workspace_size(&self) -> u64 {
        self.max_workspace_size
    }

    /// Predicted number of entries in L.
    pub fn nfact(&self) -> u64 {
        self.nfact
    }

    /// Predicted flop count without delayed pivots.
    pub fn nflop(&self) -> u64 {
        self.nflop
    }

    /// Strictly upper entries skipped during analysis.
    pub fn num_ignored(&self) -> usize {
        self.num_ignored
    }

    /// Number of nodes in the assembly tree.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Node list in assembly order (every child before its parent).
    pub fn nodes(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// Node by index.
    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Children of a node (increasing index).
    pub fn children(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].children
    }

    /// Root nodes.
    pub fn roots(&self) -> impl Iterator<Item = &Node> + '_ {
        let nnodes = self.nodes.len();
        self.nodes.iter().filter(move |node| node.parent >= nnodes)
    }

    /// Iterator over a node's ancestors, starting at its parent.
    pub fn ancestor_iterator(&self, node: &Node) -> AncestorIter<'_> {
        let mut iter = AncestorIter {
            sfact: self,
            node: Some(node.idx),
        };
        iter.next();
        iter
    }

    /// The exhausted ancestor iterator, one past the last ancestor.
    pub fn ancestor_iterator_root(&self) -> AncestorIter<'_> {
        AncestorIter {
            sfact: self,
            node: None,
        }
    }
}

/// Forward cursor over a node's ancestors.
#[derive(Debug, Clone)]
pub struct AncestorIter<'a> {
    sfact: &'a SymbolicFactor,
    node: Option<usize>,
}

impl<'a> AncestorIter<'a> {
    /// Node the cursor points at, `None` once past the root.
    pub fn current(&self) -> Option<&'a Node> {
        self.node.map(|idx| &self.sfact.nodes[idx])
    }
}

impl<'a> Iterator for AncestorIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        let idx = self.node?;
        let node = &self.sfact.nodes[idx];
        self.node = if node.parent < self.sfact.nodes.len() {
            Some(node.parent)
        } else {
            None
        };
        Some(node)
    }
}

impl PartialEq for AncestorIter<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.sfact, other.sfact) && self.node == other.node
    }
}
