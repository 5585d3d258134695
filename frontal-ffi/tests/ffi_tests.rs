//! Tests of the C boundary, called from Rust.

use std::ptr;

use frontal_ffi::*;

/// Lower triangle of [[4, 1, 0], [1, 4, 1], [0, 1, 4]].
fn tridiag3() -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    (vec![0, 2, 4, 5], vec![0, 1, 1, 2, 2], vec![4.0, 1.0, 4.0, 1.0, 4.0])
}

fn options() -> FrontalFactorOptions {
    let mut opts = FrontalFactorOptions {
        print_level: 0,
        action: true,
        u: 0.0,
        small: 0.0,
        num_threads: 0,
    };
    unsafe { frontal_default_options(&mut opts) };
    opts.num_threads = 1;
    opts
}

#[test]
fn test_null_handles_are_safe() {
    unsafe {
        frontal_destroy_symbolic(ptr::null_mut());
        frontal_destroy_num_subtree_dbl(true, ptr::null_mut());
        frontal_destroy_num_subtree_dbl(false, ptr::null_mut());

        let mut x = [0.0; 3];
        let code = frontal_subtree_solve_fwd_dbl(false, ptr::null(), 1, x.as_mut_ptr(), 3);
        assert_eq!(code, FRONTAL_ERROR_NULL);
        assert_eq!(
            frontal_symbolic_sizes(ptr::null(), ptr::null_mut(), ptr::null_mut(), ptr::null_mut()),
            FRONTAL_ERROR_NULL
        );
    }
}

#[test]
fn test_default_options() {
    let opts = options();
    assert!(opts.action);
    assert!(opts.u > 0.0 && opts.u <= 0.5);
    assert!(opts.small > 0.0);
}

#[test]
fn test_full_round_trip() {
    let (cptr, row, val) = tridiag3();
    let opts = options();
    unsafe {
        let mut flag = 1;
        let sym = frontal_create_symbolic(3, cptr.as_ptr(), row.as_ptr(), 1, &mut flag);
        assert!(!sym.is_null());
        assert_eq!(flag, 0);

        let (mut mem, mut work, mut nodes) = (0u64, 0u64, 0usize);
        assert_eq!(frontal_symbolic_sizes(sym, &mut mem, &mut work, &mut nodes), 0);
        assert_eq!(mem, 5);
        assert!(work >= 4);
        assert_eq!(nodes, 2);

        for posdef in [true, false] {
            let mut stats = FrontalFactorStats::default();
            let sub = frontal_create_num_subtree_dbl(posdef, sym, val.as_ptr(), ptr::null(), &opts, &mut stats);
            assert!(!sub.is_null());
            assert_eq!(stats.flag, 0);
            assert_eq!(stats.num_neg, 0);

            // b = A [1, 1, 1]
            let mut x = [5.0, 6.0, 5.0];
            assert_eq!(frontal_subtree_solve_fwd_dbl(posdef, sub, 1, x.as_mut_ptr(), 3), 0);
            assert_eq!(frontal_subtree_solve_diag_dbl(posdef, sub, 1, x.as_mut_ptr(), 3), 0);
            assert_eq!(frontal_subtree_solve_bwd_dbl(posdef, sub, 1, x.as_mut_ptr(), 3), 0);
            for v in x {
                assert!((v - 1.0).abs() < 1e-14);
            }

            // Wrong flag is refused
            let code = frontal_subtree_solve_fwd_dbl(!posdef, sub, 1, x.as_mut_ptr(), 3);
            assert_eq!(code, FRONTAL_ERROR_POSDEF_MISMATCH);

            frontal_destroy_num_subtree_dbl(posdef, sub);
        }

        frontal_destroy_symbolic(sym);
    }
}

#[test]
fn test_posdef_rejection_returns_null() {
    // [[1, 2], [2, 1]] is indefinite
    let (cptr, row, val) = (vec![0, 2, 3], vec![0, 1, 1], vec![1.0, 2.0, 1.0]);
    let opts = options();
    unsafe {
        let sym = frontal_create_symbolic(2, cptr.as_ptr(), row.as_ptr(), 32, ptr::null_mut());
        assert!(!sym.is_null());

        let mut stats = FrontalFactorStats::default();
        let sub = frontal_create_num_subtree_dbl(true, sym, val.as_ptr(), ptr::null(), &opts, &mut stats);
        assert!(sub.is_null());
        assert_eq!(stats.flag, -6);

        // The numeric handle keeps the symbolic factor alive
        let sub = frontal_create_num_subtree_dbl(false, sym, val.as_ptr(), ptr::null(), &opts, &mut stats);
        frontal_destroy_symbolic(sym);
        assert!(!sub.is_null());
        assert_eq!(stats.num_neg, 1);

        let mut piv = [usize::MAX; 2];
        let mut d = [0.0; 4];
        assert_eq!(frontal_subtree_enquire_dbl(false, sub, piv.as_mut_ptr(), d.as_mut_ptr()), 0);
        assert_eq!(piv, [0, 1]);

        // Shift D and solve through the fused phase
        let altered = [d[0], d[1], 2.0 * d[2], d[3]];
        assert_eq!(frontal_subtree_alter_dbl(false, sub, altered.as_ptr()), 0);
        let mut x = [1.0, 0.0];
        assert_eq!(frontal_subtree_solve_fwd_dbl(false, sub, 1, x.as_mut_ptr(), 2), 0);
        assert_eq!(frontal_subtree_solve_diag_bwd_dbl(false, sub, 1, x.as_mut_ptr(), 2), 0);
        assert!(x.iter().all(|v| v.is_finite()));

        assert_eq!(frontal_subtree_alter_dbl(true, sub, altered.as_ptr()), FRONTAL_ERROR_POSDEF_MISMATCH);
        frontal_destroy_num_subtree_dbl(false, sub);
    }
}

#[test]
fn test_out_of_range_options_are_rejected() {
    let (cptr, row, val) = tridiag3();
    unsafe {
        let sym = frontal_create_symbolic(3, cptr.as_ptr(), row.as_ptr(), 1, ptr::null_mut());
        assert!(!sym.is_null());

        let cases = [(2.0, 1e-20), (0.0, 1e-20), (-0.5, 1e-20), (0.1, -1.0)];
        for (u, small) in cases {
            let mut opts = options();
            opts.u = u;
            opts.small = small;
            let mut stats = FrontalFactorStats::default();
            let sub = frontal_create_num_subtree_dbl(false, sym, val.as_ptr(), ptr::null(), &opts, &mut stats);
            assert!(sub.is_null(), "u = {}, small = {} accepted", u, small);
            assert_eq!(stats.flag, -16);
        }

        // The boundary of the range is accepted
        let mut opts = options();
        opts.u = 0.5;
        opts.small = 0.0;
        let mut stats = FrontalFactorStats::default();
        let sub = frontal_create_num_subtree_dbl(true, sym, val.as_ptr(), ptr::null(), &opts, &mut stats);
        assert!(!sub.is_null());
        assert_eq!(stats.flag, 0);
        frontal_destroy_num_subtree_dbl(true, sub);
        frontal_destroy_symbolic(sym);
    }
}

#[test]
fn test_invalid_pattern_flag() {
    let (cptr, row) = (vec![0, 1, 2], vec![0, 5]);
    unsafe {
        let mut flag = 0;
        let sym = frontal_create_symbolic(2, cptr.as_ptr(), row.as_ptr(), 1, &mut flag);
        assert!(sym.is_null());
        assert_eq!(flag, -4);
    }
}
