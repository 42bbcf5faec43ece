//! Block index mapping
//!
//! The single source of truth for "who owns this block" and "where does it
//! live in the owner's tile". Every phase of the factorization consults the
//! same arithmetic here; no other module derives owners or local offsets on
//! its own, which keeps the panel and trailing paths from drifting apart.

use crate::config::LuConfig;
use crate::error::Result;
use crate::topology::Coord;

/// Pure mapping from global block coordinates to owners and local offsets.
///
/// Blocks are distributed cyclically: global block `(r, c)` lives on grid
/// coordinate `(r mod Q, c mod P)` at local offset `(r div Q, c div P)`.
#[derive(Clone, Copy, Debug)]
pub struct BlockMap {
    width: usize,
    height: usize,
    blocks: usize,
}

impl BlockMap {
    /// Build the mapper from a validated configuration
    pub fn new(cfg: &LuConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            width: cfg.torus_width,
            height: cfg.torus_height,
            blocks: cfg.global_blocks(),
        })
    }

    /// Number of blocks along one dimension of the global matrix
    pub fn global_blocks(&self) -> usize {
        self.blocks
    }

    /// Grid coordinate owning global block `(block_row, block_col)`
    pub fn owner_of(&self, block_row: usize, block_col: usize) -> Coord {
        debug_assert!(block_row < self.blocks && block_col < self.blocks);
        Coord {
            row: block_row % self.height,
            col: block_col % self.width,
        }
    }

    /// Local block-row offset of global block-row `block_row` on its owner
    pub fn local_row(&self, block_row: usize) -> usize {
        block_row / self.height
    }

    /// Local block-column offset of global block-column `block_col` on its owner
    pub fn local_col(&self, block_col: usize) -> usize {
        block_col / self.width
    }

    /// Global block-row of local block-row `local` on grid row `row`
    pub fn global_row(&self, row: usize, local: usize) -> usize {
        local * self.height + row
    }

    /// Global block-column of local block-column `local` on grid column `col`
    pub fn global_col(&self, col: usize, local: usize) -> usize {
        local * self.width + col
    }

    /// Owned global block-rows strictly greater than `k` on grid row `row`,
    /// as `(local_block_row, global_block_row)` pairs in ascending order.
    ///
    /// Used for the column-panel extent at step `k` and the trailing row
    /// range; the first local index is `k/Q + 1` exactly when this grid row
    /// has already consumed its step-`k` block, `k/Q` otherwise.
    pub fn rows_after(&self, row: usize, k: usize) -> Vec<(usize, usize)> {
        let first = k / self.height + usize::from(k % self.height >= row);
        (first..self.blocks / self.height)
            .map(|l| (l, self.global_row(row, l)))
            .collect()
    }

    /// Owned global block-columns strictly greater than `k` on grid column
    /// `col`, as `(local_block_col, global_block_col)` pairs.
    pub fn cols_after(&self, col: usize, k: usize) -> Vec<(usize, usize)> {
        let first = k / self.width + usize::from(k % self.width >= col);
        (first..self.blocks / self.width)
            .map(|l| (l, self.global_col(col, l)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Pivoting;

    fn map(n: usize, b: usize, p: usize, q: usize) -> BlockMap {
        BlockMap::new(&LuConfig {
            matrix_size: n,
            block_size: b,
            torus_width: p,
            torus_height: q,
            max_inflight: 1,
            pivoting: Pivoting::None,
        })
        .unwrap()
    }

    #[test]
    fn test_owner_is_cyclic() {
        let m = map(32, 4, 2, 2);
        assert_eq!(m.owner_of(0, 0), Coord { row: 0, col: 0 });
        assert_eq!(m.owner_of(3, 2), Coord { row: 1, col: 0 });
        assert_eq!(m.owner_of(5, 5), Coord { row: 1, col: 1 });
    }

    #[test]
    fn test_local_global_roundtrip() {
        let m = map(48, 4, 3, 2);
        for gr in 0..m.global_blocks() {
            let owner_row = m.owner_of(gr, 0).row;
            assert_eq!(m.global_row(owner_row, m.local_row(gr)), gr);
        }
        for gc in 0..m.global_blocks() {
            let owner_col = m.owner_of(0, gc).col;
            assert_eq!(m.global_col(owner_col, m.local_col(gc)), gc);
        }
    }

    #[test]
    fn test_rows_after_skips_consumed() {
        let m = map(32, 4, 2, 2);
        // 8 block-rows on a height-2 grid: row 0 owns 0,2,4,6 and row 1 owns 1,3,5,7
        assert_eq!(m.rows_after(0, 0), vec![(1, 2), (2, 4), (3, 6)]);
        assert_eq!(m.rows_after(1, 0), vec![(0, 1), (1, 3), (2, 5), (3, 7)]);
        assert_eq!(m.rows_after(1, 7), vec![]);
        assert_eq!(m.rows_after(0, 6), vec![]);
        assert_eq!(m.rows_after(1, 6), vec![(3, 7)]);
    }
}
