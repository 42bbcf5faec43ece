//! Common test utilities
#![allow(dead_code)]

use gridlu::config::{LuConfig, Pivoting};

/// Build a validated run configuration
pub fn config(n: usize, b: usize, p: usize, q: usize) -> LuConfig {
    let cfg = LuConfig {
        matrix_size: n,
        block_size: b,
        torus_width: p,
        torus_height: q,
        max_inflight: 2,
        pivoting: Pivoting::None,
    };
    cfg.validate().expect("test configuration invalid");
    cfg
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Deterministic diagonally dominant dense matrix for kernel tests
pub fn diag_dominant_dense(n: usize) -> Vec<f64> {
    let mut a = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..n {
            a[i * n + j] = if i == j {
                n as f64 + ((i * 3) % 5) as f64
            } else {
                (((i * 31 + j * 17) % 19) as f64 - 9.0) / 19.0
            };
        }
    }
    a
}
