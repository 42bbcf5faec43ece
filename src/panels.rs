//! Double-buffered panel storage
//!
//! Two generations of row-panel and column-panel block buffers alternate by
//! `step mod 2`, so the broadcasts filling generation `k+1` can proceed while
//! trailing updates reading generation `k` are still draining on the
//! accelerator. Outstanding panel memory is thereby a small constant
//! regardless of matrix size. Reuse safety is enforced by the scheduler's
//! iteration structure (generation `g` is drained before step `g+2` refills
//! it), not by internal locking; the lease flags here only assert that
//! discipline.

use crate::config::LuConfig;
use crate::element::Element;
use crate::tile::{AlignedBuf, BlockView};

/// Number of concurrently live panel generations
pub const GENERATIONS: usize = 2;

/// Generation slot for `step`
pub fn generation(step: usize) -> usize {
    step % GENERATIONS
}

/// Holds both generations of row- and column-panel block buffers.
///
/// Row-panel slot `i` holds the panel block for the i-th owned block-column
/// of the current step's panel extent; column-panel slots mirror that for
/// owned block-rows. Slots are sized to the maximum possible extent.
pub struct PanelBuffers<T> {
    row: [Vec<AlignedBuf<T>>; GENERATIONS],
    col: [Vec<AlignedBuf<T>>; GENERATIONS],
    leased: [bool; GENERATIONS],
    block_size: usize,
}

impl<T: Element> PanelBuffers<T> {
    /// Allocate panel buffers for one worker of `cfg`
    pub fn new(cfg: &LuConfig) -> Self {
        let b = cfg.block_size;
        let alloc = |slots: usize| -> [Vec<AlignedBuf<T>>; GENERATIONS] {
            [
                (0..slots).map(|_| AlignedBuf::new(b * b)).collect(),
                (0..slots).map(|_| AlignedBuf::new(b * b)).collect(),
            ]
        };
        Self {
            row: alloc(cfg.local_block_cols()),
            col: alloc(cfg.local_block_rows()),
            leased: [false; GENERATIONS],
            block_size: b,
        }
    }

    /// Lease the buffer set for `step`. The same generation must have been
    /// released (two steps ago) before it can be leased again.
    pub fn acquire(&mut self, step: usize) -> usize {
        let gen = generation(step);
        debug_assert!(
            !self.leased[gen],
            "generation {} acquired before release",
            gen
        );
        self.leased[gen] = true;
        gen
    }

    /// Return the buffer set of `step`'s generation for reuse at `step + 2`
    pub fn release(&mut self, step: usize) {
        let gen = generation(step);
        debug_assert!(self.leased[gen], "generation {} released twice", gen);
        self.leased[gen] = false;
    }

    /// Row-panel slot `idx` of generation `gen`, as a mutable slice
    pub fn row_block_mut(&mut self, gen: usize, idx: usize) -> &mut [T] {
        self.row[gen][idx].as_mut_slice()
    }

    /// Column-panel slot `idx` of generation `gen`, as a mutable slice
    pub fn col_block_mut(&mut self, gen: usize, idx: usize) -> &mut [T] {
        self.col[gen][idx].as_mut_slice()
    }

    /// Raw view of row-panel slot `idx` of generation `gen`
    pub fn row_view(&self, gen: usize, idx: usize) -> BlockView<T> {
        BlockView::new(self.row[gen][idx].handle(), self.block_size)
    }

    /// Raw view of column-panel slot `idx` of generation `gen`
    pub fn col_view(&self, gen: usize, idx: usize) -> BlockView<T> {
        BlockView::new(self.col[gen][idx].handle(), self.block_size)
    }
}
