//! Sequential reference factorizations and solves
//!
//! Dense single-worker implementations used for validation and for the
//! partial-pivoting fallback path. The no-pivoting pair produces and consumes
//! the same stored factor form as the block kernels (negated reciprocals on
//! the diagonal, negated multipliers below it), so it can solve against an
//! assembled distributed result directly.

use crate::element::Element;
use crate::error::{Error, Result};

/// In-place LU factorization without pivoting.
///
/// `a` is row-major `n x n` with row stride `lda`. Accurate only for
/// diagonally dominant inputs; fails on a pivot too small to divide by.
pub fn gefa_nopvt<T: Element>(a: &mut [T], n: usize, lda: usize) -> Result<()> {
    for k in 0..n {
        let d = a[k * lda + k];
        if d.abs() <= T::epsilon() {
            return Err(Error::SingularPivot {
                index: k,
                magnitude: d.abs().to_f64(),
            });
        }
        let inv = -T::one() / d;
        a[k * lda + k] = inv;
        for i in (k + 1)..n {
            a[i * lda + k] = a[i * lda + k] * inv;
        }
        for j in (k + 1)..n {
            let u = a[k * lda + j];
            for i in (k + 1)..n {
                a[i * lda + j] = a[i * lda + j] + a[i * lda + k] * u;
            }
        }
    }
    Ok(())
}

/// Solve `A x = b` in place from factors produced by [`gefa_nopvt`].
///
/// On return `b` holds the solution.
pub fn gesl_nopvt<T: Element>(a: &[T], b: &mut [T], n: usize, lda: usize) {
    // L y = b: sub-diagonal entries hold negated multipliers, so this is a
    // plain multiply-add sweep.
    for k in 0..n.saturating_sub(1) {
        for i in (k + 1)..n {
            b[i] = b[i] + b[k] * a[i * lda + k];
        }
    }
    // U x = y: diagonal entries hold -1/u_kk.
    for k in (0..n).rev() {
        let scale = b[k] * a[k * lda + k];
        b[k] = -scale;
        for i in 0..k {
            b[i] = b[i] + scale * a[i * lda + k];
        }
    }
}

/// In-place LU factorization with partial (row) pivoting.
///
/// Row interchanges are applied from column `k` onward only, LINPACK style;
/// `ipvt[k]` records the row swapped into position `k`, to be replayed by
/// [`gesl`]. Multipliers are stored negated; the diagonal keeps `u_kk`.
pub fn gefa<T: Element>(a: &mut [T], n: usize, lda: usize, ipvt: &mut [usize]) -> Result<()> {
    debug_assert_eq!(ipvt.len(), n);
    for (i, p) in ipvt.iter_mut().enumerate() {
        *p = i;
    }
    for k in 0..n.saturating_sub(1) {
        let mut pvt = k;
        let mut max_val = a[k * lda + k].abs();
        for i in (k + 1)..n {
            let v = a[i * lda + k].abs();
            if v > max_val {
                max_val = v;
                pvt = i;
            }
        }
        if max_val <= T::epsilon() {
            return Err(Error::SingularPivot {
                index: k,
                magnitude: max_val.to_f64(),
            });
        }
        if pvt != k {
            for j in k..n {
                a.swap(k * lda + j, pvt * lda + j);
            }
        }
        ipvt[k] = pvt;

        let inv = -T::one() / a[k * lda + k];
        for i in (k + 1)..n {
            a[i * lda + k] = a[i * lda + k] * inv;
        }
        for j in (k + 1)..n {
            let u = a[k * lda + j];
            for i in (k + 1)..n {
                a[i * lda + j] = a[i * lda + j] + a[i * lda + k] * u;
            }
        }
    }
    Ok(())
}

/// `y += A x` for a row-major `n x n` matrix with row stride `lda`
pub fn dmxpy<T: Element>(a: &[T], x: &[T], y: &mut [T], n: usize, lda: usize) {
    for (i, yi) in y.iter_mut().enumerate().take(n) {
        let row = &a[i * lda..i * lda + n];
        *yi = row
            .iter()
            .zip(x)
            .fold(*yi, |acc, (&aij, &xj)| acc + aij * xj);
    }
}

/// Solve `A x = b` in place from factors produced by [`gefa`]
pub fn gesl<T: Element>(a: &[T], b: &mut [T], ipvt: &[usize], n: usize, lda: usize) {
    for k in 0..n.saturating_sub(1) {
        if ipvt[k] != k {
            b.swap(k, ipvt[k]);
        }
        for i in (k + 1)..n {
            b[i] = b[i] + b[k] * a[i * lda + k];
        }
    }
    for k in (0..n).rev() {
        b[k] = b[k] / a[k * lda + k];
        for i in 0..k {
            b[i] = b[i] - b[k] * a[i * lda + k];
        }
    }
}
