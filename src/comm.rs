//! Worker-to-worker collectives
//!
//! The scheduler talks to its peers only through [`Collective`]: broadcasts
//! along torus row and column groups, a sum-reduction used by input
//! generation, and a world barrier. [`LocalFabric`] is the in-process
//! implementation backing the multi-threaded harness; every worker of a
//! cluster holds one endpoint over shared rendezvous cells.
//!
//! Correctness relies on each rank driving collectives for a given group in
//! the same order. The scheduler's canonical per-step phase order guarantees
//! that; the fabric itself only sequences operations per `(group, op)` pair.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::topology::{Group, GroupId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;

/// Communication surface required by the scheduler
pub trait Collective: Send {
    /// Total number of workers
    fn world_size(&self) -> usize;

    /// This worker's rank in `0..world_size`
    fn rank(&self) -> usize;

    /// Broadcast `buf` from `root` to every member of `group`.
    ///
    /// Every member must pass a buffer of the same length. Ranks outside the
    /// group must not call.
    fn broadcast<T: Element>(&self, buf: &mut [T], root: usize, group: &Group) -> Result<()>;

    /// Element-wise sum over `group`, result delivered to `root`.
    ///
    /// On non-root members `buf` is input only; on `root` it is replaced by
    /// the sum.
    fn reduce_sum<T: Element>(&self, buf: &mut [T], root: usize, group: &Group) -> Result<()>;

    /// Block until every worker in the world has arrived
    fn barrier(&self);
}

/// Which collective a rendezvous cell carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum CellOp {
    Broadcast,
    Reduce,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct CellKey {
    group: GroupId,
    op: CellOp,
}

#[derive(Default)]
struct CellState {
    /// Sequence number of the collective currently published, if any
    seq: u64,
    data: Vec<u8>,
    acks: usize,
    busy: bool,
}

#[derive(Default)]
struct Cell {
    state: Mutex<CellState>,
    cv: Condvar,
}

#[derive(Default)]
struct FabricShared {
    cells: Mutex<HashMap<CellKey, Arc<Cell>>>,
}

impl FabricShared {
    fn cell(&self, key: CellKey) -> Arc<Cell> {
        Arc::clone(self.cells.lock().entry(key).or_default())
    }
}

// Cell payloads are plain byte vectors, so element reads must not assume
// alignment.
fn copy_out<T: Element>(data: &[u8], buf: &mut [T]) {
    let size = std::mem::size_of::<T>();
    for (i, v) in buf.iter_mut().enumerate() {
        *v = bytemuck::pod_read_unaligned(&data[i * size..(i + 1) * size]);
    }
}

/// In-process collective fabric endpoint for one worker.
///
/// Created in bulk by [`LocalFabric::cluster`]; endpoints are moved onto the
/// worker threads of a run.
pub struct LocalFabric {
    rank: usize,
    world_size: usize,
    shared: Arc<FabricShared>,
    barrier: Arc<std::sync::Barrier>,
    /// Next sequence number per cell, tracked independently by each rank.
    /// Identical call order per group keeps the counters in lockstep.
    seqs: Mutex<HashMap<CellKey, u64>>,
}

impl LocalFabric {
    /// Create endpoints for a `world_size`-worker in-process cluster
    pub fn cluster(world_size: usize) -> Vec<LocalFabric> {
        assert!(world_size > 0, "empty cluster");
        let shared = Arc::new(FabricShared::default());
        let barrier = Arc::new(std::sync::Barrier::new(world_size));
        (0..world_size)
            .map(|rank| LocalFabric {
                rank,
                world_size,
                shared: Arc::clone(&shared),
                barrier: Arc::clone(&barrier),
                seqs: Mutex::new(HashMap::new()),
            })
            .collect()
    }

    fn next_seq(&self, key: CellKey) -> u64 {
        let mut seqs = self.seqs.lock();
        let seq = seqs.entry(key).or_insert(0);
        *seq += 1;
        *seq
    }

    fn check_member(&self, group: &Group, root: usize) -> Result<()> {
        if !group.contains(self.rank) {
            return Err(Error::Internal(format!(
                "rank {} is not a member of group {:?}",
                self.rank, group.id
            )));
        }
        if !group.contains(root) {
            return Err(Error::Internal(format!(
                "root {} is outside group {:?}",
                root, group.id
            )));
        }
        Ok(())
    }
}

impl Collective for LocalFabric {
    fn world_size(&self) -> usize {
        self.world_size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn broadcast<T: Element>(&self, buf: &mut [T], root: usize, group: &Group) -> Result<()> {
        self.check_member(group, root)?;
        if group.len() <= 1 {
            return Ok(());
        }
        let key = CellKey {
            group: group.id,
            op: CellOp::Broadcast,
        };
        let seq = self.next_seq(key);
        let cell = self.shared.cell(key);
        let mut state = cell.state.lock();

        if self.rank == root {
            // Wait out any previous broadcast still being drained.
            while state.busy {
                cell.cv.wait(&mut state);
            }
            state.seq = seq;
            state.data.clear();
            state.data.extend_from_slice(bytemuck::cast_slice(buf));
            state.acks = 0;
            state.busy = true;
            cell.cv.notify_all();
            while state.acks < group.len() - 1 {
                cell.cv.wait(&mut state);
            }
            state.busy = false;
            state.data.clear();
            cell.cv.notify_all();
        } else {
            while !(state.busy && state.seq == seq) {
                cell.cv.wait(&mut state);
            }
            let expected = buf.len() * std::mem::size_of::<T>();
            if state.data.len() != expected {
                return Err(Error::CollectiveMismatch {
                    expected: state.data.len(),
                    got: expected,
                });
            }
            copy_out(&state.data, buf);
            state.acks += 1;
            cell.cv.notify_all();
        }
        Ok(())
    }

    fn reduce_sum<T: Element>(&self, buf: &mut [T], root: usize, group: &Group) -> Result<()> {
        self.check_member(group, root)?;
        if group.len() <= 1 {
            return Ok(());
        }
        let key = CellKey {
            group: group.id,
            op: CellOp::Reduce,
        };
        let seq = self.next_seq(key);
        let cell = self.shared.cell(key);
        let mut state = cell.state.lock();

        // First arrival of this round initializes the accumulator.
        while state.busy && state.seq != seq {
            cell.cv.wait(&mut state);
        }
        if !state.busy {
            state.seq = seq;
            state.data = bytemuck::cast_slice(buf).to_vec();
            state.acks = 1;
            state.busy = true;
            cell.cv.notify_all();
        } else {
            let expected = buf.len() * std::mem::size_of::<T>();
            if state.data.len() != expected {
                return Err(Error::CollectiveMismatch {
                    expected: state.data.len(),
                    got: expected,
                });
            }
            for (i, v) in buf.iter().enumerate() {
                let off = i * std::mem::size_of::<T>();
                let acc: T =
                    bytemuck::pod_read_unaligned(&state.data[off..off + std::mem::size_of::<T>()]);
                let sum = acc + *v;
                state.data[off..off + std::mem::size_of::<T>()]
                    .copy_from_slice(bytemuck::bytes_of(&sum));
            }
            state.acks += 1;
            cell.cv.notify_all();
        }

        if self.rank == root {
            while !(state.seq == seq && state.acks == group.len()) {
                cell.cv.wait(&mut state);
            }
            copy_out(&state.data, buf);
            state.busy = false;
            state.data.clear();
            cell.cv.notify_all();
        }
        Ok(())
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}
