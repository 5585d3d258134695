//! C ABI for the frontal solver.
//!
//! Symbolic factors and numeric factorizations are exposed as opaque
//! handles. Numeric entry points take a runtime `posdef` flag that must
//! match the flag the handle was created with. Every function catches
//! panics; status codes are returned as `i32` (0 success, 7 singular
//! warning, negative on error).

#![warn(missing_docs)]
#![allow(clippy::missing_safety_doc)]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::Arc;

use frontal_core::{FactorError, FactorOptions, FactorStats, Subtree, SymbolicFactor};
use tracing::error;

/// A required pointer argument was null.
pub const FRONTAL_ERROR_NULL: i32 = -1;
/// The `posdef` flag does not match the handle.
pub const FRONTAL_ERROR_POSDEF_MISMATCH: i32 = -2;
/// A panic was caught at the boundary.
pub const FRONTAL_ERROR_PANIC: i32 = -99;

/// Opaque symbolic factor handle.
pub struct FrontalSymbolic(Arc<SymbolicFactor>);

/// Opaque numeric factorization handle.
pub struct FrontalSubtree(Subtree);

/// Factorization options.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FrontalFactorOptions {
    /// Verbosity; above 9999 the factors are dumped through the log.
    pub print_level: i32,
    /// Continue past zero pivots (indefinite only).
    pub action: bool,
    /// Relative pivot threshold, in (0, 0.5]. Factorization with any other
    /// value fails with status -16.
    pub u: f64,
    /// Pivots below this magnitude are treated as zero. Must be finite and
    /// non-negative (status -16 otherwise).
    pub small: f64,
    /// Worker threads (0 = default pool).
    pub num_threads: i32,
}

impl From<&FrontalFactorOptions> for FactorOptions {
    fn from(o: &FrontalFactorOptions) -> Self {
        FactorOptions {
            print_level: o.print_level,
            action: o.action,
            u: o.u,
            small: o.small,
            num_threads: o.num_threads.max(0) as usize,
        }
    }
}

impl From<&FactorOptions> for FrontalFactorOptions {
    fn from(o: &FactorOptions) -> Self {
        FrontalFactorOptions {
            print_level: o.print_level,
            action: o.action,
            u: o.u,
            small: o.small,
            num_threads: o.num_threads as i32,
        }
    }
}

/// Factorization statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontalFactorStats {
    /// Status code
    pub flag: i32,
    /// Pivots delayed to an ancestor
    pub num_delay: i64,
    /// Negative eigenvalues of D
    pub num_neg: i64,
    /// 2x2 pivots
    pub num_two: i64,
    /// Zero pivots
    pub num_zero: i64,
    /// Largest front order
    pub maxfront: i64,
    /// Entries in L
    pub num_factor: i64,
    /// Elimination flops
    pub num_flops: i64,
    /// Peak workspace entries
    pub memory_peak: i64,
}

impl From<&FactorStats> for FrontalFactorStats {
    fn from(s: &FactorStats) -> Self {
        FrontalFactorStats {
            flag: s.flag.code(),
            num_delay: s.num_delay as i64,
            num_neg: s.num_neg as i64,
            num_two: s.num_two as i64,
            num_zero: s.num_zero as i64,
            maxfront: s.maxfront as i64,
            num_factor: s.num_factor as i64,
            num_flops: s.num_flops as i64,
            memory_peak: s.memory_peak as i64,
        }
    }
}

fn guard<F: FnOnce() -> i32>(f: F) -> i32 {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(FRONTAL_ERROR_PANIC)
}

fn status(result: Result<(), FactorError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(code = e.code(), "{}", e);
            e.code()
        }
    }
}

unsafe fn write_flag(out: *mut i32, flag: i32) {
    if !out.is_null() {
        *out = flag;
    }
}

/// Resolve a numeric handle, checking the `posdef` flag.
unsafe fn subtree<'a>(posdef: bool, handle: *const FrontalSubtree) -> Result<&'a Subtree, i32> {
    let Some(h) = handle.as_ref() else {
        return Err(FRONTAL_ERROR_NULL);
    };
    if h.0.is_posdef() != posdef {
        error!(posdef, "posdef flag does not match the factorization handle");
        return Err(FRONTAL_ERROR_POSDEF_MISMATCH);
    }
    Ok(&h.0)
}

/// Fill `options` with the default options.
#[no_mangle]
pub unsafe extern "C" fn frontal_default_options(options: *mut FrontalFactorOptions) {
    if let Some(out) = options.as_mut() {
        *out = FrontalFactorOptions::from(&FactorOptions::default());
    }
}

/// Analyse the lower triangle of a CSC pattern.
///
/// `ptr` has `n + 1` entries and `row` has `ptr[n]`. Returns null on error,
/// with the status in `flag` (if non-null).
#[no_mangle]
pub unsafe extern "C" fn frontal_create_symbolic(
    n: usize,
    ptr: *const usize,
    row: *const usize,
    nemin: usize,
    flag: *mut i32,
) -> *mut FrontalSymbolic {
    if ptr.is_null() || (row.is_null() && *ptr.add(n) > 0) {
        write_flag(flag, FRONTAL_ERROR_NULL);
        return ptr::null_mut();
    }
    let result = catch_unwind(AssertUnwindSafe(|| {
        let ptr = slice::from_raw_parts(ptr, n + 1);
        let nnz = ptr[n];
        let row: &[usize] = if nnz == 0 { &[] } else { slice::from_raw_parts(row, nnz) };
        SymbolicFactor::new(n, ptr, row, nemin)
    }));
    match result {
        Ok(Ok(sf)) => {
            write_flag(flag, 0);
            Box::into_raw(Box::new(FrontalSymbolic(Arc::new(sf))))
        }
        Ok(Err(e)) => {
            error!(code = e.code(), "{}", e);
            write_flag(flag, e.code());
            ptr::null_mut()
        }
        Err(_) => {
            write_flag(flag, FRONTAL_ERROR_PANIC);
            ptr::null_mut()
        }
    }
}

/// Release a symbolic handle. Null is a no-op.
///
/// Numeric factorizations built from it keep their own reference.
#[no_mangle]
pub unsafe extern "C" fn frontal_destroy_symbolic(handle: *mut FrontalSymbolic) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Read the size predictions of a symbolic factor. Null outputs are skipped.
#[no_mangle]
pub unsafe extern "C" fn frontal_symbolic_sizes(
    handle: *const FrontalSymbolic,
    factor_mem_size: *mut u64,
    max_workspace_size: *mut u64,
    num_nodes: *mut usize,
) -> i32 {
    let Some(h) = handle.as_ref() else {
        return FRONTAL_ERROR_NULL;
    };
    if let Some(out) = factor_mem_size.as_mut() {
        *out = h.0.factor_mem_size();
    }
    if let Some(out) = max_workspace_size.as_mut() {
        *out = h.0.max_workspace_size();
    }
    if let Some(out) = num_nodes.as_mut() {
        *out = h.0.num_nodes();
    }
    0
}

/// Factor the values `aval` against a symbolic factor.
///
/// `aval` has one entry per pattern entry; `scaling` is null or has `n`
/// entries; `options` may be null for defaults. Returns null on failure,
/// with the status in `stats.flag` (if non-null).
#[no_mangle]
pub unsafe extern "C" fn frontal_create_num_subtree_dbl(
    posdef: bool,
    symbolic: *const FrontalSymbolic,
    aval: *const f64,
    scaling: *const f64,
    options: *const FrontalFactorOptions,
    stats: *mut FrontalFactorStats,
) -> *mut FrontalSubtree {
    let fail = |code: i32| -> *mut FrontalSubtree {
        if let Some(out) = stats.as_mut() {
            *out = FrontalFactorStats {
                flag: code,
                ..Default::default()
            };
        }
        ptr::null_mut()
    };

    let Some(sym) = symbolic.as_ref() else {
        return fail(FRONTAL_ERROR_NULL);
    };
    let nnz = sym.0.nnz();
    if aval.is_null() && nnz > 0 {
        return fail(FRONTAL_ERROR_NULL);
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        let aval: &[f64] = if nnz == 0 { &[] } else { slice::from_raw_parts(aval, nnz) };
        let scaling = (!scaling.is_null()).then(|| slice::from_raw_parts(scaling, sym.0.n()));
        let opts = options.as_ref().map(FactorOptions::from).unwrap_or_default();
        Subtree::create(posdef, sym.0.clone(), aval, scaling, &opts)
    }));

    match result {
        Ok(Ok(sub)) => {
            if let Some(out) = stats.as_mut() {
                *out = FrontalFactorStats::from(sub.stats());
            }
            Box::into_raw(Box::new(FrontalSubtree(sub)))
        }
        Ok(Err(e)) => {
            error!(code = e.code(), posdef, "{}", e);
            fail(e.code())
        }
        Err(_) => fail(FRONTAL_ERROR_PANIC),
    }
}

/// Release a numeric handle. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn frontal_destroy_num_subtree_dbl(posdef: bool, handle: *mut FrontalSubtree) {
    if handle.is_null() {
        return;
    }
    let sub = Box::from_raw(handle);
    if sub.0.is_posdef() != posdef {
        error!(posdef, "posdef flag does not match the handle being destroyed");
    }
    drop(sub);
}

macro_rules! solve_entry {
    ($(#[$doc:meta])* $name:ident => $method:ident) => {
        $(#[$doc])*
        #[no_mangle]
        pub unsafe extern "C" fn $name(
            posdef: bool,
            handle: *const FrontalSubtree,
            nrhs: usize,
            x: *mut f64,
            ldx: usize,
        ) -> i32 {
            guard(|| {
                let sub = match subtree(posdef, handle) {
                    Ok(sub) => sub,
                    Err(code) => return code,
                };
                if nrhs == 0 {
                    return 0;
                }
                if x.is_null() {
                    return FRONTAL_ERROR_NULL;
                }
                let len = (nrhs - 1) * ldx + sub.symbolic().n();
                let x = slice::from_raw_parts_mut(x, len);
                status(sub.$method(nrhs, x, ldx))
            })
        }
    };
}

solve_entry!(
    /// Scale, then solve L y = b in place.
    frontal_subtree_solve_fwd_dbl => solve_fwd
);
solve_entry!(
    /// Apply D^{-1} in place (no-op for LL^T).
    frontal_subtree_solve_diag_dbl => solve_diag
);
solve_entry!(
    /// Apply D^{-1} and solve L^T x = y in place, then unscale.
    frontal_subtree_solve_diag_bwd_dbl => solve_diag_bwd
);
solve_entry!(
    /// Solve L^T x = y in place, then unscale.
    frontal_subtree_solve_bwd_dbl => solve_bwd
);

/// Read the pivot order (`n` entries) and D (`2n` entries, or `n` for LL^T).
/// Either output may be null.
#[no_mangle]
pub unsafe extern "C" fn frontal_subtree_enquire_dbl(
    posdef: bool,
    handle: *const FrontalSubtree,
    piv_order: *mut usize,
    d: *mut f64,
) -> i32 {
    guard(|| {
        let sub = match subtree(posdef, handle) {
            Ok(sub) => sub,
            Err(code) => return code,
        };
        let n = sub.symbolic().n();
        let dlen = if posdef { n } else { 2 * n };
        let piv = (!piv_order.is_null()).then(|| slice::from_raw_parts_mut(piv_order, n));
        let d = (!d.is_null()).then(|| slice::from_raw_parts_mut(d, dlen));
        status(sub.enquire(piv, d))
    })
}

/// Replace D (`2n` entries, LDL^T only).
#[no_mangle]
pub unsafe extern "C" fn frontal_subtree_alter_dbl(posdef: bool, handle: *mut FrontalSubtree, d: *const f64) -> i32 {
    guard(|| {
        let Some(h) = handle.as_mut() else {
            return FRONTAL_ERROR_NULL;
        };
        if h.0.is_posdef() != posdef {
            error!(posdef, "posdef flag does not match the factorization handle");
            return FRONTAL_ERROR_POSDEF_MISMATCH;
        }
        if posdef {
            return status(h.0.alter(&[]));
        }
        if d.is_null() {
            return FRONTAL_ERROR_NULL;
        }
        let d = slice::from_raw_parts(d, 2 * h.0.symbolic().n());
        status(h.0.alter(d))
    })
}
