//! Input generation and validation helpers
//!
//! Inputs for the no-pivoting path are random uniform matrices made
//! diagonally dominant: every worker fills its tile from a rank-seeded
//! generator, zeroes the diagonal elements it owns, and the off-diagonal row
//! sums are then reduced along each grid row onto the diagonal. Identical
//! seeds make a run reproducible for a fixed grid shape.
//!
//! The dense scatter/assemble pair and the scaled residual exist for
//! validation: tests factor a distributed matrix, assemble the factors, solve
//! sequentially and judge the residual against machine precision.

use crate::block_map::BlockMap;
use crate::comm::Collective;
use crate::config::LuConfig;
use crate::element::Element;
use crate::error::Result;
use crate::kernels::reference;
use crate::tile::LocalTile;
use crate::topology::{Coord, TorusTopology};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Base seed mixed with the worker rank for input generation
const GENERATION_SEED: u64 = 0x6c75_6772_6964;

/// Generate this worker's tile of a diagonally dominant random matrix.
///
/// Collective: every worker of the run must call it, in the same order
/// relative to other collectives.
pub fn generate_tile<T: Element, C: Collective>(cfg: &LuConfig, comm: &C) -> Result<LocalTile<T>> {
    let topo = TorusTopology::new(cfg.torus_width, cfg.torus_height, comm.world_size())?;
    let map = BlockMap::new(cfg)?;
    let coord = topo.rank_to_coord(comm.rank());
    let b = cfg.block_size;
    let cols = cfg.local_cols();

    let mut tile = LocalTile::new(cfg);
    let mut rng = StdRng::seed_from_u64(GENERATION_SEED ^ comm.rank() as u64);
    for v in tile.as_mut_slice().iter_mut() {
        *v = T::from_f64(rng.gen::<f64>());
    }

    // Zero owned diagonal elements so the row-sum reduce below can deposit
    // the dominance term without excluding anything.
    for lbr in 0..cfg.local_block_rows() {
        let gbr = map.global_row(coord.row, lbr);
        if map.owner_of(gbr, gbr).col == coord.col {
            let lbc = map.local_col(gbr);
            for k in 0..b {
                tile.as_mut_slice()[(lbr * b + k) * cols + lbc * b + k] = T::zero();
            }
        }
    }

    // Per block-row, sum partial row sums across the grid row onto the
    // worker owning that row's diagonal block.
    let row_group = topo.row_group(coord.row);
    for lbr in 0..cfg.local_block_rows() {
        let gbr = map.global_row(coord.row, lbr);
        let diag_owner = topo.coord_to_rank(Coord {
            row: coord.row,
            col: map.owner_of(gbr, gbr).col,
        });
        let mut partial: Vec<T> = (0..b)
            .map(|k| {
                let row = (lbr * b + k) * cols;
                tile.as_slice()[row..row + cols]
                    .iter()
                    .fold(T::zero(), |acc, &v| acc + v)
            })
            .collect();
        comm.reduce_sum(&mut partial, diag_owner, &row_group)?;
        if comm.rank() == diag_owner {
            let lbc = map.local_col(gbr);
            for k in 0..b {
                tile.as_mut_slice()[(lbr * b + k) * cols + lbc * b + k] = partial[k];
            }
        }
    }
    Ok(tile)
}

/// Rank and in-tile index of global element `(i, j)`, per the block-cyclic
/// layout of [`BlockMap`]
fn locate(
    cfg: &LuConfig,
    topo: &TorusTopology,
    map: &BlockMap,
    i: usize,
    j: usize,
) -> (usize, usize) {
    let b = cfg.block_size;
    let rank = topo.coord_to_rank(map.owner_of(i / b, j / b));
    let local_i = map.local_row(i / b) * b + i % b;
    let local_j = map.local_col(j / b) * b + j % b;
    (rank, local_i * cfg.local_cols() + local_j)
}

/// Split a dense row-major `N x N` matrix into per-worker tiles, indexed by
/// rank.
pub fn scatter<T: Element>(dense: &[T], cfg: &LuConfig) -> Result<Vec<LocalTile<T>>> {
    cfg.validate()?;
    let n = cfg.matrix_size;
    assert_eq!(dense.len(), n * n, "dense shape mismatch");
    let topo = TorusTopology::new(cfg.torus_width, cfg.torus_height, cfg.world_size())?;
    let map = BlockMap::new(cfg)?;
    let b = cfg.block_size;
    let mut tiles: Vec<LocalTile<T>> = (0..cfg.world_size()).map(|_| LocalTile::new(cfg)).collect();
    tiles.par_iter_mut().enumerate().for_each(|(rank, tile)| {
        let coord = topo.rank_to_coord(rank);
        let cols = cfg.local_cols();
        for li in 0..cfg.local_rows() {
            let gi = map.global_row(coord.row, li / b) * b + li % b;
            for lj in 0..cols {
                let gj = map.global_col(coord.col, lj / b) * b + lj % b;
                tile.as_mut_slice()[li * cols + lj] = dense[gi * n + gj];
            }
        }
    });
    Ok(tiles)
}

/// Assemble per-worker tiles back into a dense row-major matrix
pub fn assemble<T: Element>(tiles: &[LocalTile<T>], cfg: &LuConfig) -> Result<Vec<T>> {
    cfg.validate()?;
    assert_eq!(tiles.len(), cfg.world_size(), "tile count mismatch");
    let topo = TorusTopology::new(cfg.torus_width, cfg.torus_height, cfg.world_size())?;
    let map = BlockMap::new(cfg)?;
    let n = cfg.matrix_size;
    let mut dense = vec![T::zero(); n * n];
    dense.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for (j, out) in row.iter_mut().enumerate() {
            let (rank, idx) = locate(cfg, &topo, &map, i, j);
            *out = tiles[rank].as_slice()[idx];
        }
    });
    Ok(dense)
}

/// Right-hand side making the all-ones vector the exact solution: `b = A * 1`
pub fn rhs_for_ones<T: Element>(dense: &[T], n: usize) -> Vec<T> {
    (0..n)
        .map(|i| {
            dense[i * n..(i + 1) * n]
                .iter()
                .fold(T::zero(), |acc, &v| acc + v)
        })
        .collect()
}

/// Scaled residual `max|b - A x| / (n * ||A|| * ||x|| * eps)`.
///
/// Values around 1 indicate a solution accurate to working precision; the
/// acceptance threshold used by the tests follows the classic bound of 16.
pub fn scaled_residual<T: Element>(a: &[T], x: &[T], b: &[T], n: usize) -> f64 {
    assert_eq!(a.len(), n * n);
    assert_eq!(x.len(), n);
    assert_eq!(b.len(), n);
    // r = A x - b, accumulated the way the solve itself runs.
    let mut r: Vec<T> = b.iter().map(|&v| -v).collect();
    reference::dmxpy(a, x, &mut r, n, n);
    let resid = r.iter().fold(0.0f64, |m, &v| m.max(v.to_f64().abs()));
    let norma = a.iter().fold(0.0f64, |m, &v| m.max(v.to_f64().abs()));
    let normx = x.iter().fold(0.0f64, |m, &v| m.max(v.to_f64().abs()));
    let eps = T::epsilon().to_f64();
    let denom = n as f64 * norma * normx * eps;
    if denom == 0.0 {
        return if resid == 0.0 { 0.0 } else { f64::INFINITY };
    }
    resid / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalFabric;
    use crate::config::Pivoting;

    fn cfg(n: usize, b: usize, p: usize, q: usize) -> LuConfig {
        LuConfig {
            matrix_size: n,
            block_size: b,
            torus_width: p,
            torus_height: q,
            max_inflight: 1,
            pivoting: Pivoting::None,
        }
    }

    #[test]
    fn test_scatter_assemble_roundtrip() {
        let cfg = cfg(24, 4, 3, 2);
        let dense: Vec<f64> = (0..24 * 24).map(|v| v as f64).collect();
        let tiles = scatter(&dense, &cfg).unwrap();
        assert_eq!(assemble(&tiles, &cfg).unwrap(), dense);
    }

    #[test]
    fn test_scatter_places_blocks_cyclically() {
        let cfg = cfg(16, 4, 2, 2);
        let dense: Vec<f64> = (0..16 * 16).map(|v| v as f64).collect();
        let tiles = scatter(&dense, &cfg).unwrap();
        // Global block (1, 0) belongs to rank 2 (grid row 1, col 0) at local
        // block (0, 0); its first element is dense[4 * 16].
        assert_eq!(tiles[2].as_slice()[0], dense[4 * 16]);
        // Global block (2, 3) belongs to rank 1 at local block (1, 1).
        assert_eq!(tiles[1].as_slice()[4 * 8 + 4], dense[8 * 16 + 12]);
    }

    #[test]
    fn test_scatter_agrees_with_block_map() {
        let cfg = cfg(24, 4, 3, 2);
        let topo = TorusTopology::new(3, 2, 6).unwrap();
        let map = BlockMap::new(&cfg).unwrap();
        let n = cfg.matrix_size;
        let b = cfg.block_size;
        let dense: Vec<f64> = (0..n * n).map(|v| v as f64).collect();
        let tiles = scatter(&dense, &cfg).unwrap();
        for i in 0..n {
            for j in 0..n {
                let rank = topo.coord_to_rank(map.owner_of(i / b, j / b));
                let idx = (map.local_row(i / b) * b + i % b) * cfg.local_cols()
                    + map.local_col(j / b) * b
                    + j % b;
                assert_eq!(tiles[rank].as_slice()[idx], dense[i * n + j]);
            }
        }
    }

    #[test]
    fn test_generated_matrix_is_diagonally_dominant() {
        let cfg = cfg(16, 4, 2, 2);
        let world = cfg.world_size();
        let fabrics = LocalFabric::cluster(world);
        let tiles = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = fabrics
                .into_iter()
                .map(|fabric| {
                    let cfg = cfg.clone();
                    s.spawn(move |_| {
                        let tile = generate_tile::<f64, _>(&cfg, &fabric).unwrap();
                        (fabric.rank(), tile)
                    })
                })
                .collect();
            let mut tiles: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            tiles.sort_by_key(|(rank, _)| *rank);
            tiles.into_iter().map(|(_, t)| t).collect::<Vec<_>>()
        })
        .unwrap();

        let n = cfg.matrix_size;
        let dense = assemble(&tiles, &cfg).unwrap();
        for i in 0..n {
            let off_diag: f64 = (0..n)
                .filter(|&j| j != i)
                .map(|j| dense[i * n + j])
                .sum();
            let diag = dense[i * n + i];
            assert!(diag > 0.0);
            assert!(
                (diag - off_diag).abs() < 1e-9 * off_diag.max(1.0),
                "row {} diagonal {} vs off-diagonal sum {}",
                i,
                diag,
                off_diag
            );
            for j in 0..n {
                if j != i {
                    let v = dense[i * n + j];
                    assert!((0.0..1.0).contains(&v));
                }
            }
        }
    }

    #[test]
    fn test_generation_reproducible() {
        let cfg = cfg(8, 4, 1, 1);
        let f1 = LocalFabric::cluster(1).remove(0);
        let f2 = LocalFabric::cluster(1).remove(0);
        let a = generate_tile::<f64, _>(&cfg, &f1).unwrap();
        let b = generate_tile::<f64, _>(&cfg, &f2).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_scaled_residual_of_exact_solution() {
        let n = 4;
        let a: Vec<f64> = (0..16).map(|v| (v % 5) as f64 + 1.0).collect();
        let x = vec![1.0f64; n];
        let b = rhs_for_ones(&a, n);
        assert_eq!(scaled_residual(&a, &x, &b, n), 0.0);

        let x_bad = vec![2.0f64; n];
        assert!(scaled_residual(&a, &x_bad, &b, n) > 1.0);
    }
}
