//! Frontal: a multifrontal sparse symmetric solver core
//!
//! This library factors sparse symmetric matrices given in compressed-column
//! form (lower triangle) as permuted LDL^T (indefinite) or LL^T (positive
//! definite) with the multifrontal method, and solves against the factors.
//!
//! # Phases
//!
//! - **Symbolic analysis** ([`SymbolicFactor`]): elimination tree, node
//!   amalgamation, exact storage and workspace prediction
//! - **Numeric factorization** ([`NumericSubtree`]): tree-parallel blocked
//!   elimination with threshold pivoting (LDL^T) or Cholesky (LL^T)
//! - **Solve**: forward, diagonal and backward phases, usable separately
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use frontal_core::{sparse, FactorOptions, IndefSubtree, SymbolicFactor, NEMIN_DEFAULT};
//!
//! let a = sparse::LowerCsc::from_sprs(&sparse::from_triplets_lower(
//!     2,
//!     vec![(0, 0, 4.0), (1, 0, 1.0), (1, 1, 3.0)],
//! ));
//! let symbolic = Arc::new(SymbolicFactor::new(a.n, &a.ptr, &a.row, NEMIN_DEFAULT)?);
//! let factor = IndefSubtree::factor(symbolic, &a.val, None, &FactorOptions::default())?;
//!
//! let mut x = vec![5.0, 4.0];
//! factor.solve(1, &mut x, 2)?;
//! ```
//!
//! Fill-reducing orderings are not computed here; pass one to
//! [`SymbolicFactor::with_order`].

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

pub mod error;
pub mod numeric;
pub mod options;
pub mod sparse;
pub mod subtree;
pub mod symbolic;

pub use error::{FactorError, FactorResult};
pub use numeric::{
    FrontAlloc, HeapAlloc, IndefSubtree, Indefinite, NodeFactor, NumericSubtree, Pivoting,
    PoolAlloc, Posdef, PosdefSubtree,
};
pub use options::{FactorOptions, FactorStats, StatusFlag, NEMIN_DEFAULT};
pub use subtree::Subtree;
pub use symbolic::{AncestorIter, Node, SymbolicFactor};
