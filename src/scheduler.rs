//! Distributed factorization driver
//!
//! One `LuScheduler` runs on each worker and walks the global block diagonal.
//! Every step has a fixed phase order, identical on all ranks so that
//! collectives for a given group always meet:
//!
//! 1. drain the trailing updates issued two steps ago and reclaim their
//!    panel generation,
//! 2. factorize the pivot block on its owner,
//! 3. broadcast the factorized pivot along column groups, then row groups,
//! 4. update the step's row and column panels where owned, then broadcast
//!    every panel block along its perpendicular group in ascending order,
//! 5. enqueue the trailing updates without waiting for them.
//!
//! Trailing updates of step `k` therefore overlap with the communication and
//! panel work of step `k + 1`; correctness across the overlap hangs on the
//! per-block last-writer dependency chain handed to the dispatcher. The next
//! pivot block's update is enqueued first so step `k + 1` can factorize as
//! soon as possible.

use crate::block_map::BlockMap;
use crate::comm::Collective;
use crate::config::LuConfig;
use crate::dispatch::{Dispatcher, OpDesc, OpHandle, OpKind};
use crate::element::Element;
use crate::error::Result;
use crate::kernels::Accelerator;
use crate::panels::{generation, PanelBuffers, GENERATIONS};
use crate::tile::{AlignedBuf, BlockView, LocalTile};
use crate::topology::{Coord, TorusTopology};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Timing summary of one worker's factorization run
#[derive(Clone, Debug)]
pub struct RunReport {
    /// The reporting worker's rank
    pub rank: usize,
    /// Global matrix dimension of the run
    pub matrix_size: usize,
    /// Wall time between the entry and exit barriers
    pub elapsed: Duration,
}

impl RunReport {
    /// Factorization rate in GFLOP/s, using the standard LU operation count
    /// `2/3 n^3 + 2 n^2`.
    pub fn gflops(&self) -> f64 {
        let n = self.matrix_size as f64;
        (2.0 / 3.0 * n * n * n + 2.0 * n * n) / self.elapsed.as_secs_f64() / 1.0e9
    }
}

/// Per-worker factorization driver.
///
/// Consumes a tile holding this worker's share of the input matrix and
/// returns it holding the worker's share of the factors.
pub struct LuScheduler<T: Element, A: Accelerator<T>, C: Collective> {
    cfg: LuConfig,
    topo: TorusTopology,
    map: BlockMap,
    coord: Coord,
    comm: C,
    accel: Arc<A>,
    dispatcher: Dispatcher,
    tile: LocalTile<T>,
    panels: PanelBuffers<T>,
    /// Factorized pivot block as seen along this worker's grid row
    pivot_for_rows: AlignedBuf<T>,
    /// Factorized pivot block as seen along this worker's grid column
    pivot_for_cols: AlignedBuf<T>,
    /// Handle of the most recent unretired write per global block
    last_writer: HashMap<(usize, usize), OpHandle>,
    /// In-flight trailing updates per panel generation
    trailing: [Vec<OpHandle>; GENERATIONS],
}

impl<T: Element, A: Accelerator<T>, C: Collective> LuScheduler<T, A, C> {
    /// Build a scheduler for one worker
    pub fn new(cfg: LuConfig, comm: C, accel: A, tile: LocalTile<T>) -> Result<Self> {
        cfg.validate()?;
        let topo = TorusTopology::new(cfg.torus_width, cfg.torus_height, comm.world_size())?;
        let map = BlockMap::new(&cfg)?;
        let coord = topo.rank_to_coord(comm.rank());
        let b = cfg.block_size;
        let dispatcher = Dispatcher::new(cfg.max_inflight);
        let panels = PanelBuffers::new(&cfg);
        Ok(Self {
            cfg,
            topo,
            map,
            coord,
            comm,
            accel: Arc::new(accel),
            dispatcher,
            tile,
            panels,
            pivot_for_rows: AlignedBuf::new(b * b),
            pivot_for_cols: AlignedBuf::new(b * b),
            last_writer: HashMap::new(),
            trailing: [Vec::new(), Vec::new()],
        })
    }

    /// Run the factorization to completion.
    ///
    /// On success the returned tile holds this worker's share of the stored
    /// factors. Any kernel failure aborts the run on this worker; peers
    /// blocked in a collective with it will not be released.
    pub fn run(mut self) -> Result<(LocalTile<T>, RunReport)> {
        let nb = self.map.global_blocks();
        debug!(
            rank = self.comm.rank(),
            row = self.coord.row,
            col = self.coord.col,
            backend = self.accel.name(),
            blocks = nb,
            "starting factorization"
        );

        self.comm.barrier();
        let started = Instant::now();

        for k in 0..nb {
            let gen = generation(k);
            if k >= GENERATIONS {
                self.dispatcher.wait_all(&self.trailing[gen])?;
                self.trailing[gen].clear();
                self.panels.release(k - GENERATIONS);
            }
            self.panels.acquire(k);
            self.step(k, gen)?;
        }
        for k in nb.saturating_sub(GENERATIONS)..nb {
            let gen = generation(k);
            self.dispatcher.wait_all(&self.trailing[gen])?;
            self.trailing[gen].clear();
            self.panels.release(k);
        }

        self.comm.barrier();
        let elapsed = started.elapsed();
        debug!(rank = self.comm.rank(), ?elapsed, "factorization finished");
        let report = RunReport {
            rank: self.comm.rank(),
            matrix_size: self.cfg.matrix_size,
            elapsed,
        };
        Ok((self.tile, report))
    }

    fn writer_dep(&mut self, block_row: usize, block_col: usize) -> Vec<OpHandle> {
        self.last_writer
            .remove(&(block_row, block_col))
            .into_iter()
            .collect()
    }

    fn submit(
        &self,
        kind: OpKind,
        block_row: usize,
        block_col: usize,
        deps: &[OpHandle],
        task: impl FnOnce() -> Result<()> + Send + 'static,
    ) -> OpHandle {
        let desc = OpDesc {
            kind,
            block_row,
            block_col,
        };
        self.dispatcher.submit(desc, deps, task)
    }

    fn step(&mut self, k: usize, gen: usize) -> Result<()> {
        let b = self.cfg.block_size;
        let my = self.coord;
        let pivot_owner = self.map.owner_of(k, k);
        let last = k + 1 == self.map.global_blocks();
        trace!(step = k, "begin");

        // Factorize the pivot block on its owner and stage it for broadcast.
        if my == pivot_owner {
            let (lr, lc) = (self.map.local_row(k), self.map.local_col(k));
            let view = self.tile.block_view(lr, lc);
            let deps = self.writer_dep(k, k);
            let accel = Arc::clone(&self.accel);
            let handle = self.submit(OpKind::FactorizeDiagonal, k, k, &deps, move || {
                accel.factorize_diagonal(view, b)
            });
            self.dispatcher.wait(handle)?;
            if !last {
                self.tile
                    .copy_block_out(lr, lc, self.pivot_for_rows.as_mut_slice());
                self.tile
                    .copy_block_out(lr, lc, self.pivot_for_cols.as_mut_slice());
            }
        }
        if last {
            return Ok(());
        }

        // Pivot broadcasts, column groups first. Every rank participates in
        // its own groups; groups not containing the pivot owner move stale
        // scratch that nothing reads, keeping the collective schedule uniform
        // across the torus.
        let col_root = self.topo.coord_to_rank(Coord {
            row: pivot_owner.row,
            col: my.col,
        });
        self.comm.broadcast(
            self.pivot_for_cols.as_mut_slice(),
            col_root,
            &self.topo.col_group(my.col),
        )?;
        let row_root = self.topo.coord_to_rank(Coord {
            row: my.row,
            col: pivot_owner.col,
        });
        self.comm.broadcast(
            self.pivot_for_rows.as_mut_slice(),
            row_root,
            &self.topo.row_group(my.row),
        )?;

        // Panel updates on the pivot row and column owners.
        let cols = self.map.cols_after(my.col, k);
        let rows = self.map.rows_after(my.row, k);
        let in_pivot_row = my.row == pivot_owner.row;
        let in_pivot_col = my.col == pivot_owner.col;
        let mut panel_ops = Vec::new();
        if in_pivot_row {
            let lr = self.map.local_row(k);
            let pivot = BlockView::new(self.pivot_for_rows.handle(), b);
            for &(lc, gc) in &cols {
                let view = self.tile.block_view(lr, lc);
                let deps = self.writer_dep(k, gc);
                let accel = Arc::clone(&self.accel);
                panel_ops.push(self.submit(OpKind::UpdateRowPanel, k, gc, &deps, move || {
                    accel.update_row_panel(view, pivot, b)
                }));
            }
        }
        if in_pivot_col {
            let lc = self.map.local_col(k);
            let pivot = BlockView::new(self.pivot_for_cols.handle(), b);
            for &(lr, gr) in &rows {
                let view = self.tile.block_view(lr, lc);
                let deps = self.writer_dep(gr, k);
                let accel = Arc::clone(&self.accel);
                panel_ops.push(self.submit(OpKind::UpdateColPanel, gr, k, &deps, move || {
                    accel.update_col_panel(view, pivot, b)
                }));
            }
        }
        self.dispatcher.wait_all(&panel_ops)?;

        // Stage finished panel blocks into this generation's buffers, then
        // broadcast them: row-panel blocks along column groups, column-panel
        // blocks along row groups, both in ascending block order.
        if in_pivot_row {
            let lr = self.map.local_row(k);
            for &(lc, _) in &cols {
                self.tile
                    .copy_block_out(lr, lc, self.panels.row_block_mut(gen, lc));
            }
        }
        if in_pivot_col {
            let lc = self.map.local_col(k);
            for &(lr, _) in &rows {
                self.tile
                    .copy_block_out(lr, lc, self.panels.col_block_mut(gen, lr));
            }
        }
        let panel_col_root = self.topo.coord_to_rank(Coord {
            row: pivot_owner.row,
            col: my.col,
        });
        let col_group = self.topo.col_group(my.col);
        for &(lc, _) in &cols {
            self.comm
                .broadcast(self.panels.row_block_mut(gen, lc), panel_col_root, &col_group)?;
        }
        let panel_row_root = self.topo.coord_to_rank(Coord {
            row: my.row,
            col: pivot_owner.col,
        });
        let row_group = self.topo.row_group(my.row);
        for &(lr, _) in &rows {
            self.comm
                .broadcast(self.panels.col_block_mut(gen, lr), panel_row_root, &row_group)?;
        }

        // Trailing updates run fully asynchronously; the next pivot block
        // goes first so step k + 1 stalls as little as possible.
        let mut targets = Vec::with_capacity(rows.len() * cols.len());
        for &(lr, gr) in &rows {
            for &(lc, gc) in &cols {
                targets.push((lr, gr, lc, gc));
            }
        }
        targets.sort_by_key(|&(_, gr, _, gc)| (gr != k + 1 || gc != k + 1, gr, gc));
        for (lr, gr, lc, gc) in targets {
            let view = self.tile.block_view(lr, lc);
            let col_panel = self.panels.col_view(gen, lr);
            let row_panel = self.panels.row_view(gen, lc);
            let deps = self.writer_dep(gr, gc);
            let accel = Arc::clone(&self.accel);
            let handle = self.submit(OpKind::UpdateTrailing, gr, gc, &deps, move || {
                accel.update_trailing(view, col_panel, row_panel, b)
            });
            self.last_writer.insert((gr, gc), handle);
            self.trailing[gen].push(handle);
        }
        trace!(
            step = k,
            trailing = self.trailing[gen].len(),
            "trailing updates enqueued"
        );
        Ok(())
    }
}
