//! Supernode detection and amalgamation.
//!
//! Works on the postordered elimination tree: label `t` is the `t`-th column
//! in postorder, `parent[t]` its parent label (`n` for a root). Fundamental
//! supernodes are found first, then small nodes are merged into their parents
//! until every non-root node eliminates at least `nemin` variables.

use super::etree::postorder;

/// Node partition produced by amalgamation.
#[derive(Debug, Clone)]
pub(crate) struct Amalgamation {
    /// Postorder labels eliminated by each node (sorted), nodes in postorder
    pub members: Vec<Vec<usize>>,
    /// Parent node of each node (`members.len()` for a root)
    pub parent: Vec<usize>,
}

impl Amalgamation {
    pub fn num_nodes(&self) -> usize {
        self.members.len()
    }
}

/// Group postordered columns into supernodes and amalgamate with `nemin`.
pub(crate) fn amalgamate(parent: &[usize], counts: &[usize], nemin: usize) -> Amalgamation {
    let n = parent.len();
    if n == 0 {
        return Amalgamation {
            members: vec![],
            parent: vec![],
        };
    }

    // Fundamental supernodes: column t-1 joins t when t is its parent and the
    // structures agree (count drops by exactly one), so no fill is added.
    let mut group_start = Vec::new();
    let mut group_of = vec![0usize; n];
    for t in 0..n {
        let joins_previous = t > 0 && parent[t - 1] == t && counts[t - 1] == counts[t] + 1;
        if !joins_previous {
            group_start.push(t);
        }
        group_of[t] = group_start.len() - 1;
    }
    let ngroups = group_start.len();
    group_start.push(n);

    let mut group_parent = vec![ngroups; ngroups];
    let mut nelim = vec![0usize; ngroups];
    for g in 0..ngroups {
        let last = group_start[g + 1] - 1;
        if parent[last] < n {
            group_parent[g] = group_of[parent[last]];
        }
        nelim[g] = group_start[g + 1] - group_start[g];
    }

    // Merge small children into their parents. Groups are in postorder, so a
    // group's children have all been settled by the time it is visited and
    // its parent has not been touched yet.
    let mut merged_into = vec![ngroups; ngroups];
    for g in 0..ngroups {
        let p = group_parent[g];
        if p < ngroups && nelim[g] < nemin {
            merged_into[g] = p;
            nelim[p] += nelim[g];
        }
    }

    let find = |mut g: usize| {
        while merged_into[g] < ngroups {
            g = merged_into[g];
        }
        g
    };

    // Compact the surviving groups and re-postorder them
    let mut compact = vec![usize::MAX; ngroups];
    let mut reps = Vec::new();
    for g in 0..ngroups {
        if merged_into[g] == ngroups {
            compact[g] = reps.len();
            reps.push(g);
        }
    }
    let nnodes = reps.len();

    let rep_parent: Vec<usize> = reps
        .iter()
        .map(|&g| {
            let p = group_parent[g];
            if p < ngroups {
                compact[find(p)]
            } else {
                nnodes
            }
        })
        .collect();

    let post = postorder(&rep_parent);
    let mut final_idx = vec![0usize; nnodes];
    for (i, &r) in post.iter().enumerate() {
        final_idx[r] = i;
    }

    let mut members = vec![Vec::new(); nnodes];
    for g in 0..ngroups {
        let node = final_idx[compact[find(g)]];
        members[node].extend(group_start[g]..group_start[g + 1]);
    }

    let mut node_parent = vec![nnodes; nnodes];
    for (r, &p) in rep_parent.iter().enumerate() {
        if p < nnodes {
            node_parent[final_idx[r]] = final_idx[p];
        }
    }

    Amalgamation {
        members,
        parent: node_parent,
    }
}
