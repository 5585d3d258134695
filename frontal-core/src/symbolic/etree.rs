//! Pattern validation, elimination tree, postorder and column counts.
//!
//! All routines here work on elimination positions: position `k` is the
//! `k`-th variable eliminated. A parent value of `n` marks a root.

use crate::error::{FactorError, FactorResult};

/// Adjacency of the symmetric pattern in elimination positions.
///
/// For position `k`, `earlier(k)` lists neighbours eliminated before `k`
/// (the strict upper part of column `k` of the permuted matrix).
#[derive(Debug, Clone)]
pub(crate) struct PatternGraph {
    n: usize,
    ptr: Vec<usize>,
    adj: Vec<usize>,
}

impl PatternGraph {
    /// Neighbours of `k` with smaller position.
    pub fn earlier(&self, k: usize) -> &[usize] {
        &self.adj[self.ptr[k]..self.ptr[k + 1]]
    }

    pub fn n(&self) -> usize {
        self.n
    }
}

/// Validate compressed-column arrays.
pub(crate) fn validate_pattern(n: usize, ptr: &[usize], row: &[usize]) -> FactorResult<()> {
    if ptr.len() != n + 1 {
        return Err(FactorError::InvalidPattern(format!(
            "ptr length {} != n+1 = {}",
            ptr.len(),
            n + 1
        )));
    }
    if ptr[0] != 0 {
        return Err(FactorError::InvalidPattern(format!(
            "ptr[0] = {} (must be 0)",
            ptr[0]
        )));
    }
    for j in 0..n {
        if ptr[j + 1] < ptr[j] {
            return Err(FactorError::InvalidPattern(format!(
                "ptr decreases at column {}: {} > {}",
                j,
                ptr[j],
                ptr[j + 1]
            )));
        }
    }
    if ptr[n] != row.len() {
        return Err(FactorError::InvalidPattern(format!(
            "ptr[n] = {} but row has {} entries",
            ptr[n],
            row.len()
        )));
    }
    if let Some((p, &r)) = row.iter().enumerate().find(|&(_, &r)| r >= n) {
        return Err(FactorError::InvalidPattern(format!(
            "row index {} at position {} out of range [0, {})",
            r, p, n
        )));
    }
    Ok(())
}

/// Validate an order vector (`order[i]` = position of variable `i`).
pub(crate) fn validate_order(n: usize, order: &[usize]) -> FactorResult<()> {
    if order.len() != n {
        return Err(FactorError::InvalidPattern(format!(
            "order length {} != n = {}",
            order.len(),
            n
        )));
    }
    let mut seen = vec![false; n];
    for (i, &p) in order.iter().enumerate() {
        if p >= n || seen[p] {
            return Err(FactorError::InvalidPattern(format!(
                "order is not a permutation: variable {} maps to {}",
                i, p
            )));
        }
        seen[p] = true;
    }
    Ok(())
}

/// Build the earlier-neighbour graph from the lower triangle of the pattern.
///
/// Returns the graph and the number of strictly upper entries skipped.
pub(crate) fn build_graph(
    n: usize,
    ptr: &[usize],
    row: &[usize],
    order: &[usize],
) -> (PatternGraph, usize) {
    let mut counts = vec![0usize; n];
    let mut ignored = 0usize;

    for col in 0..n {
        for &r in &row[ptr[col]..ptr[col + 1]] {
            if r < col {
                ignored += 1;
            } else if r > col {
                let (pr, pc) = (order[r], order[col]);
                counts[pr.max(pc)] += 1;
            }
        }
    }

    let mut gptr = vec![0usize; n + 1];
    for k in 0..n {
        gptr[k + 1] = gptr[k] + counts[k];
    }

    let mut next = gptr.clone();
    let mut adj = vec![0usize; gptr[n]];
    for col in 0..n {
        for &r in &row[ptr[col]..ptr[col + 1]] {
            if r > col {
                let (pr, pc) = (order[r], order[col]);
                let hi = pr.max(pc);
                adj[next[hi]] = pr.min(pc);
                next[hi] += 1;
            }
        }
    }

    (PatternGraph { n, ptr: gptr, adj }, ignored)
}

/// Elimination tree by Liu's algorithm with path compression.
pub(crate) fn elimination_tree(graph: &PatternGraph) -> Vec<usize> {
    let n = graph.n();
    let mut parent = vec![n; n]; // n means "no parent" (root)
    let mut ancestor = vec![n; n];

    for k in 0..n {
        for &i in graph.earlier(k) {
            // Walk from i towards the root of its current subtree, compressing
            let mut r = i;
            while r < k {
                let next = ancestor[r];
                ancestor[r] = k;
                if next == n {
                    parent[r] = k;
                }
                r = next;
            }
        }
    }

    parent
}

/// Postorder of a forest given by parent links (`parent[j] >= n` for roots).
///
/// Children are visited in increasing index order, so smaller-indexed
/// subtrees come first.
pub(crate) fn postorder(parent: &[usize]) -> Vec<usize> {
    let n = parent.len();

    // Child lists built in reverse so first_child holds the smallest child
    let mut first_child = vec![n; n];
    let mut next_sibling = vec![n; n];
    for j in (0..n).rev() {
        let p = parent[j];
        if p < n {
            next_sibling[j] = first_child[p];
            first_child[p] = j;
        }
    }

    let mut post = Vec::with_capacity(n);
    let mut stack: Vec<usize> = Vec::with_capacity(n);
    for root in (0..n).filter(|&j| parent[j] >= n) {
        stack.push(root);
        while let Some(&top) = stack.last() {
            let child = first_child[top];
            if child < n {
                // Detach so the child is visited once
                first_child[top] = next_sibling[child];
                stack.push(child);
            } else {
                stack.pop();
                post.push(top);
            }
        }
    }

    post
}

/// Exact column counts of L (diagonal included) via row subtrees.
pub(crate) fn column_counts(graph: &PatternGraph, parent: &[usize]) -> Vec<usize> {
    let n = graph.n();
    let mut counts = vec![1usize; n];
    let mut mark = vec![n; n];

    for k in 0..n {
        mark[k] = k;
        for &i in graph.earlier(k) {
            // Row k of L is the union of etree paths from i up to k
            let mut j = i;
            while j < k && mark[j] != k {
                counts[j] += 1;
                mark[j] = k;
                j = parent[j];
            }
        }
    }

    counts
}
