//! Block ownership arithmetic across grid shapes

mod common;

use gridlu::block_map::BlockMap;
use gridlu::topology::TorusTopology;
use std::collections::HashSet;

#[test]
fn test_every_block_has_exactly_one_home() {
    for (p, q) in [(1, 1), (2, 2), (3, 2), (1, 4), (4, 1)] {
        let cfg = common::config(48, 4, p, q);
        let map = BlockMap::new(&cfg).unwrap();
        let nb = map.global_blocks();

        // (owner, local slot) pairs must be distinct and cover all tiles
        // evenly.
        let mut seen = HashSet::new();
        for r in 0..nb {
            for c in 0..nb {
                let owner = map.owner_of(r, c);
                let slot = (owner, map.local_row(r), map.local_col(c));
                assert!(seen.insert(slot), "double-booked slot {:?}", slot);
                assert!(map.local_row(r) < cfg.local_block_rows());
                assert!(map.local_col(c) < cfg.local_block_cols());
            }
        }
        assert_eq!(
            seen.len(),
            cfg.world_size() * cfg.local_block_rows() * cfg.local_block_cols()
        );
    }
}

#[test]
fn test_local_to_global_inverts_ownership() {
    let cfg = common::config(48, 4, 3, 2);
    let map = BlockMap::new(&cfg).unwrap();
    let topo = TorusTopology::new(3, 2, 6).unwrap();
    for rank in 0..cfg.world_size() {
        let coord = topo.rank_to_coord(rank);
        for lr in 0..cfg.local_block_rows() {
            for lc in 0..cfg.local_block_cols() {
                let (gr, gc) = (map.global_row(coord.row, lr), map.global_col(coord.col, lc));
                assert_eq!(map.owner_of(gr, gc), coord);
                assert_eq!(map.local_row(gr), lr);
                assert_eq!(map.local_col(gc), lc);
            }
        }
    }
}

#[test]
fn test_remaining_extents_partition_the_trailing_range() {
    // For any step, the per-grid-row extents must partition the remaining
    // global block rows; collective counts derived from them are then
    // consistent across the torus. Same for columns.
    let cfg = common::config(64, 4, 2, 4);
    let map = BlockMap::new(&cfg).unwrap();
    let nb = map.global_blocks();
    for k in 0..nb {
        let mut rows: Vec<usize> = (0..cfg.torus_height)
            .flat_map(|r| map.rows_after(r, k).into_iter().map(|(_, g)| g))
            .collect();
        rows.sort_unstable();
        assert_eq!(rows, ((k + 1)..nb).collect::<Vec<_>>(), "step {}", k);

        let mut cols: Vec<usize> = (0..cfg.torus_width)
            .flat_map(|c| map.cols_after(c, k).into_iter().map(|(_, g)| g))
            .collect();
        cols.sort_unstable();
        assert_eq!(cols, ((k + 1)..nb).collect::<Vec<_>>(), "step {}", k);
    }
}
