//! CPU implementation of the block kernels
//!
//! Operates directly on raw block views. Loop nests keep the per-element
//! update order identical to the sequential reference (`kernels::reference`):
//! for every element, contributions are applied in ascending pivot-index
//! order, so a distributed run and a single-worker run produce bit-identical
//! factors.

use super::Accelerator;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::tile::BlockView;

/// Always-available CPU backend for the four block operations
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuAccelerator;

impl CpuAccelerator {
    /// Create a CPU accelerator
    pub fn new() -> Self {
        Self
    }
}

#[inline(always)]
unsafe fn at<T: Element>(view: BlockView<T>, i: usize, j: usize) -> *mut T {
    (view.ptr as *mut T).add(i * view.stride + j)
}

impl<T: Element> Accelerator<T> for CpuAccelerator {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn factorize_diagonal(&self, a: BlockView<T>, b: usize) -> Result<()> {
        unsafe {
            for k in 0..b {
                let d = *at(a, k, k);
                if d.abs() <= T::epsilon() {
                    return Err(Error::SingularPivot {
                        index: k,
                        magnitude: d.abs().to_f64(),
                    });
                }
                // Store the negated reciprocal so later phases never divide
                let inv = -T::one() / d;
                *at(a, k, k) = inv;
                for i in (k + 1)..b {
                    *at(a, i, k) = *at(a, i, k) * inv;
                }
                for j in (k + 1)..b {
                    let u = *at(a, k, j);
                    for i in (k + 1)..b {
                        *at(a, i, j) = *at(a, i, j) + *at(a, i, k) * u;
                    }
                }
            }
        }
        Ok(())
    }

    fn update_row_panel(&self, a: BlockView<T>, pivot: BlockView<T>, b: usize) -> Result<()> {
        unsafe {
            for k in 0..b {
                for i in (k + 1)..b {
                    let l = *at(pivot, i, k);
                    for j in 0..b {
                        *at(a, i, j) = *at(a, i, j) + l * *at(a, k, j);
                    }
                }
            }
        }
        Ok(())
    }

    fn update_col_panel(&self, a: BlockView<T>, pivot: BlockView<T>, b: usize) -> Result<()> {
        unsafe {
            for k in 0..b {
                for j in 0..k {
                    let u = *at(pivot, j, k);
                    for i in 0..b {
                        *at(a, i, k) = *at(a, i, k) + *at(a, i, j) * u;
                    }
                }
                let d = *at(pivot, k, k);
                for i in 0..b {
                    *at(a, i, k) = *at(a, i, k) * d;
                }
            }
        }
        Ok(())
    }

    fn update_trailing(
        &self,
        a: BlockView<T>,
        col_panel: BlockView<T>,
        row_panel: BlockView<T>,
        b: usize,
    ) -> Result<()> {
        unsafe {
            for k in 0..b {
                for i in 0..b {
                    let l = *at(col_panel, i, k);
                    for j in 0..b {
                        *at(a, i, j) = *at(a, i, j) + l * *at(row_panel, k, j);
                    }
                }
            }
        }
        Ok(())
    }
}
