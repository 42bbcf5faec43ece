//! Block-level compute kernels
//!
//! The scheduler drives four operations on `B x B` blocks. All of them work
//! on the *stored factor form* of the no-pivoting path: after factorization a
//! diagonal element holds the negated reciprocal `-1/u_kk`, sub-diagonal L
//! entries hold negated multipliers, and U entries are stored plainly. Storing
//! the factors this way turns every panel and trailing update into pure
//! multiply-adds with no divisions outside the diagonal factorization.
//!
//! - **factorize-diagonal**: in-place LU of the pivot block, producing the
//!   stored form above.
//! - **update-row-panel**: forward-eliminates a block right of the pivot with
//!   the pivot's stored L, leaving the block's share of U.
//! - **update-column-panel**: right-multiplies a block below the pivot by
//!   `U^-1` (column by column, using the stored diagonal reciprocals), leaving
//!   the negated L panel.
//! - **update-trailing**: rank-B update `A += col_panel * row_panel`; the
//!   subtraction is implicit in the column panel's negation.

mod cpu;
pub mod reference;

pub use cpu::CpuAccelerator;

use crate::element::Element;
use crate::error::Result;
use crate::tile::BlockView;

/// Accelerator capability consumed by the compute dispatcher.
///
/// Implementations execute synchronously on the calling thread; asynchrony
/// and dependency ordering are the dispatcher's job. The `BlockView` handles
/// address memory the caller guarantees to be disjoint from any concurrently
/// executing operation's output (see [`crate::dispatch`]).
pub trait Accelerator<T: Element>: Send + Sync + 'static {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Factorize the pivot block in place (no pivoting).
    ///
    /// Fails with [`crate::Error::SingularPivot`] if a diagonal element is
    /// too small to divide by.
    fn factorize_diagonal(&self, a: BlockView<T>, b: usize) -> Result<()>;

    /// Update a row-panel block in place using the factorized pivot block
    fn update_row_panel(&self, a: BlockView<T>, pivot: BlockView<T>, b: usize) -> Result<()>;

    /// Update a column-panel block in place using the factorized pivot block
    fn update_col_panel(&self, a: BlockView<T>, pivot: BlockView<T>, b: usize) -> Result<()>;

    /// Apply one rank-B trailing update to a block in place
    fn update_trailing(
        &self,
        a: BlockView<T>,
        col_panel: BlockView<T>,
        row_panel: BlockView<T>,
        b: usize,
    ) -> Result<()>;
}
