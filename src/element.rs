//! Element types supported by the factorization kernels
//!
//! The distributed path moves blocks between tiles, generation buffers and the
//! collective fabric as raw bytes, so elements must be plain-old-data in
//! addition to supporting float arithmetic.

use num_traits::Float;
use std::fmt;

/// Scalar element type for matrices and panel buffers.
///
/// Implemented for `f32` and `f64`. The `Pod` bound lets the collective fabric
/// ship buffers as byte slices without per-type plumbing.
pub trait Element:
    Float + bytemuck::Pod + Send + Sync + fmt::Debug + fmt::Display + 'static
{
    /// Lossy conversion from `f64`, used by input generation
    fn from_f64(v: f64) -> Self;

    /// Widening conversion to `f64`, used by diagnostics and residual checks
    fn to_f64(self) -> f64;
}

impl Element for f32 {
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    fn from_f64(v: f64) -> Self {
        v
    }

    fn to_f64(self) -> f64 {
        self
    }
}
