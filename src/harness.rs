//! In-process torus launcher and end-to-end validation
//!
//! Spawns one scheduler thread per worker over a [`LocalFabric`] cluster,
//! feeds each its tile and collects tiles and timing reports back in rank
//! order. The partial-pivoting configuration bypasses the distributed path
//! entirely and runs the sequential reference factorization, which is the
//! only place row interchanges are available.
//!
//! A worker that fails mid-run leaves peers blocked in their next collective;
//! like the process-per-worker deployments this models, such a run must be
//! torn down rather than resumed.

use crate::comm::{Collective, LocalFabric};
use crate::config::{LuConfig, Pivoting};
use crate::data;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::kernels::{reference, Accelerator};
use crate::scheduler::{LuScheduler, RunReport};
use crate::tile::LocalTile;
use std::time::Instant;
use tracing::info;

/// Residual acceptance bound, in units of `n * ||A|| * ||x|| * eps`
pub const RESIDUAL_THRESHOLD: f64 = 16.0;

/// Result of a full factorization across the torus
#[derive(Debug)]
pub struct FactorizeOutput<T> {
    /// Factor tiles, indexed by rank
    pub tiles: Vec<LocalTile<T>>,
    /// Per-worker timing, indexed by rank
    pub reports: Vec<RunReport>,
    /// Row interchanges, present only for a partial-pivoting run
    pub pivots: Option<Vec<usize>>,
}

/// Outcome of checking a computed solution against the inputs
#[derive(Clone, Copy, Debug)]
pub struct ValidationSummary {
    /// Scaled residual `max|b - A x| / (n * ||A|| * ||x|| * eps)`
    pub residual: f64,
    /// True if the residual is within [`RESIDUAL_THRESHOLD`]
    pub ok: bool,
}

/// Generate every worker's input tile for `cfg`.
///
/// Tiles are produced by worker threads over a private fabric, exactly as a
/// run would generate them, and returned in rank order.
pub fn generate_inputs<T: Element>(cfg: &LuConfig) -> Result<Vec<LocalTile<T>>> {
    cfg.validate()?;
    let fabrics = LocalFabric::cluster(cfg.world_size());
    let results = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = fabrics
            .into_iter()
            .map(|fabric| {
                let cfg = cfg.clone();
                s.spawn(move |_| {
                    let rank = fabric.rank();
                    data::generate_tile::<T, _>(&cfg, &fabric).map(|tile| (rank, tile))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker thread panicked"))
            .collect::<Vec<_>>()
    })
    .expect("worker scope panicked");
    collect_ranked(results)
}

/// Factorize `tiles` (indexed by rank) on an in-process torus.
///
/// `accel` is cloned onto every worker. For [`Pivoting::Partial`] the
/// configuration is restricted to a single worker and the factorization runs
/// sequentially on the calling thread.
pub fn run_torus<T, A>(cfg: &LuConfig, accel: A, tiles: Vec<LocalTile<T>>) -> Result<FactorizeOutput<T>>
where
    T: Element,
    A: Accelerator<T> + Clone,
{
    cfg.validate()?;
    if tiles.len() != cfg.world_size() {
        return Err(Error::InvalidConfiguration {
            param: "tiles",
            reason: format!(
                "got {} tiles for a world of {}",
                tiles.len(),
                cfg.world_size()
            ),
        });
    }
    if cfg.pivoting == Pivoting::Partial {
        return run_sequential_pivoting(cfg, tiles);
    }

    let fabrics = LocalFabric::cluster(cfg.world_size());
    let results = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = fabrics
            .into_iter()
            .zip(tiles)
            .map(|(fabric, tile)| {
                let cfg = cfg.clone();
                let accel = accel.clone();
                s.spawn(move |_| {
                    let rank = fabric.rank();
                    LuScheduler::new(cfg, fabric, accel, tile)?
                        .run()
                        .map(|(tile, report)| (rank, (tile, report)))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker thread panicked"))
            .collect::<Vec<_>>()
    })
    .expect("worker scope panicked");

    let ranked = collect_ranked(results)?;
    let (tiles, reports) = ranked.into_iter().unzip();
    Ok(FactorizeOutput {
        tiles,
        reports,
        pivots: None,
    })
}

fn run_sequential_pivoting<T: Element>(
    cfg: &LuConfig,
    mut tiles: Vec<LocalTile<T>>,
) -> Result<FactorizeOutput<T>> {
    // A 1x1 torus stores the whole matrix in one tile, already dense.
    let tile = tiles.remove(0);
    let n = cfg.matrix_size;
    let mut dense = tile.as_slice().to_vec();
    let mut ipvt = vec![0usize; n];

    let started = Instant::now();
    reference::gefa(&mut dense, n, n, &mut ipvt)?;
    let elapsed = started.elapsed();

    Ok(FactorizeOutput {
        tiles: vec![LocalTile::from_slice(&dense, n, n, cfg.block_size)],
        reports: vec![RunReport {
            rank: 0,
            matrix_size: n,
            elapsed,
        }],
        pivots: Some(ipvt),
    })
}

/// Solve `A x = b` for the all-ones right-hand side and judge the residual.
///
/// `input` is the dense original matrix, assembled before factorization;
/// `output` holds the factor tiles of the finished run.
pub fn validate<T: Element>(
    cfg: &LuConfig,
    input: &[T],
    output: &FactorizeOutput<T>,
) -> Result<ValidationSummary> {
    let n = cfg.matrix_size;
    let factors = data::assemble(&output.tiles, cfg)?;
    let mut x = data::rhs_for_ones(input, n);
    match &output.pivots {
        Some(ipvt) => reference::gesl(&factors, &mut x, ipvt, n, n),
        None => reference::gesl_nopvt(&factors, &mut x, n, n),
    }
    let b = data::rhs_for_ones(input, n);
    let residual = data::scaled_residual(input, &x, &b, n);
    let ok = residual < RESIDUAL_THRESHOLD;
    info!(residual, ok, "solution validated");
    Ok(ValidationSummary { residual, ok })
}

fn collect_ranked<V>(results: Vec<Result<(usize, V)>>) -> Result<Vec<V>> {
    let mut ranked: Vec<(usize, V)> = results.into_iter().collect::<Result<_>>()?;
    ranked.sort_by_key(|(rank, _)| *rank);
    Ok(ranked.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::CpuAccelerator;

    #[test]
    fn test_tile_count_must_match_world() {
        let cfg = LuConfig {
            matrix_size: 16,
            block_size: 4,
            torus_width: 2,
            torus_height: 2,
            max_inflight: 1,
            pivoting: Pivoting::None,
        };
        let err = run_torus::<f64, _>(&cfg, CpuAccelerator::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_partial_pivoting_reports_interchanges() {
        let cfg = LuConfig {
            matrix_size: 8,
            block_size: 4,
            torus_width: 1,
            torus_height: 1,
            max_inflight: 1,
            pivoting: Pivoting::Partial,
        };
        let n = cfg.matrix_size;
        // First diagonal entry is tiny, so step 0 must interchange.
        let mut dense = vec![0.25f64; n * n];
        for i in 0..n {
            dense[i * n + i] = if i == 0 { 1e-12 } else { 4.0 + i as f64 };
        }
        dense[(n - 1) * n] = 3.0;

        let tiles = data::scatter(&dense, &cfg).unwrap();
        let out = run_torus(&cfg, CpuAccelerator::new(), tiles).unwrap();
        let ipvt = out.pivots.as_ref().unwrap();
        assert_ne!(ipvt[0], 0);

        let summary = validate(&cfg, &dense, &out).unwrap();
        assert!(summary.ok, "residual {} out of bounds", summary.residual);
    }
}
