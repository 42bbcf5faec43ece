//! Asynchronous compute dispatcher
//!
//! Operations are submitted with an explicit list of dependency handles and
//! execute on a fixed pool of worker threads once every dependency has
//! finished. Handles are monotonically increasing; waiting on a handle retires
//! it, and a retired (or never-issued) handle passed as a dependency counts as
//! already satisfied. That keeps the graph bounded: the scheduler only ever
//! holds handles for operations of the last two generations.
//!
//! A failed operation poisons the dispatcher. Every subsequent or pending
//! `wait` reports the first failure; nothing queued after a failure runs.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

/// What an operation computes, for diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// In-place LU of a pivot block
    FactorizeDiagonal,
    /// Forward elimination of a row-panel block
    UpdateRowPanel,
    /// Back substitution of a column-panel block
    UpdateColPanel,
    /// Rank-B trailing update of one block
    UpdateTrailing,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::FactorizeDiagonal => "factorize-diagonal",
            OpKind::UpdateRowPanel => "update-row-panel",
            OpKind::UpdateColPanel => "update-col-panel",
            OpKind::UpdateTrailing => "update-trailing",
        };
        f.write_str(s)
    }
}

/// Identity of a submitted operation: its kind and target global block
#[derive(Clone, Copy, Debug)]
pub struct OpDesc {
    /// Operation kind
    pub kind: OpKind,
    /// Global block row of the output block
    pub block_row: usize,
    /// Global block column of the output block
    pub block_col: usize,
}

/// Handle to a submitted operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpHandle(u64);

type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

enum NodeState {
    /// Waiting on `unmet` dependencies
    Pending(Task),
    /// Picked up by a worker
    Running,
    /// Finished successfully, not yet retired by a wait
    Done,
}

struct OpNode {
    desc: OpDesc,
    state: NodeState,
    unmet: usize,
    dependents: Vec<u64>,
}

struct Shared {
    inner: Mutex<Inner>,
    /// Signaled when `ready` gains work or shutdown is requested
    ready_cv: Condvar,
    /// Signaled when any operation completes or fails
    done_cv: Condvar,
}

struct Inner {
    nodes: HashMap<u64, OpNode>,
    ready: VecDeque<u64>,
    next_id: u64,
    /// First failure wins; later ops are dropped unrun.
    failure: Option<(OpDesc, String)>,
    shutdown: bool,
}

/// Dependency-ordered dispatcher over a pool of accelerator worker threads.
///
/// One dispatcher serves one worker's accelerator. `max_inflight` bounds how
/// many operations execute concurrently.
pub struct Dispatcher {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn a dispatcher with `max_inflight` worker threads
    pub fn new(max_inflight: usize) -> Self {
        assert!(max_inflight > 0, "dispatcher needs at least one worker");
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                ready: VecDeque::new(),
                next_id: 1,
                failure: None,
                shutdown: false,
            }),
            ready_cv: Condvar::new(),
            done_cv: Condvar::new(),
        });
        let workers = (0..max_inflight)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("dispatch-{}", i))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn dispatcher worker")
            })
            .collect();
        Self { shared, workers }
    }

    /// Submit `task` to run after every operation in `deps` has finished.
    ///
    /// Handles in `deps` that were already retired by a `wait` count as
    /// satisfied.
    pub fn submit<F>(&self, desc: OpDesc, deps: &[OpHandle], task: F) -> OpHandle
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut inner = self.shared.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let mut unmet = 0;
        for dep in deps {
            // A handle absent from the graph was retired; its op is done.
            if let Some(node) = inner.nodes.get_mut(&dep.0) {
                if !matches!(node.state, NodeState::Done) {
                    node.dependents.push(id);
                    unmet += 1;
                }
            }
        }

        inner.nodes.insert(
            id,
            OpNode {
                desc,
                state: NodeState::Pending(Box::new(task)),
                unmet,
                dependents: Vec::new(),
            },
        );
        if unmet == 0 && inner.failure.is_none() {
            inner.ready.push_back(id);
            drop(inner);
            self.shared.ready_cv.notify_one();
        }
        OpHandle(id)
    }

    /// Block until the operation behind `handle` has finished, retiring it.
    ///
    /// Returns the first recorded failure if the dispatcher is poisoned.
    pub fn wait(&self, handle: OpHandle) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some((desc, reason)) = &inner.failure {
                let err = accelerator_error(*desc, reason.clone());
                inner.nodes.remove(&handle.0);
                return Err(err);
            }
            match inner.nodes.get(&handle.0) {
                // Already retired, or submitted before a previous failure
                // cleared the graph.
                None => return Ok(()),
                Some(node) if matches!(node.state, NodeState::Done) => {
                    inner.nodes.remove(&handle.0);
                    return Ok(());
                }
                Some(_) => self.shared.done_cv.wait(&mut inner),
            }
        }
    }

    /// Wait on every handle in `handles`, retiring all of them
    pub fn wait_all(&self, handles: &[OpHandle]) -> Result<()> {
        for &h in handles {
            self.wait(h)?;
        }
        Ok(())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.shutdown = true;
        }
        self.shared.ready_cv.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn accelerator_error(desc: OpDesc, reason: String) -> Error {
    Error::Accelerator {
        kind: desc.kind,
        block_row: desc.block_row,
        block_col: desc.block_col,
        reason,
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let (id, task) = {
            let mut inner = shared.inner.lock();
            loop {
                if inner.shutdown {
                    return;
                }
                if let Some(id) = inner.ready.pop_front() {
                    let node = inner.nodes.get_mut(&id).expect("ready node missing");
                    let task = match std::mem::replace(&mut node.state, NodeState::Running) {
                        NodeState::Pending(task) => task,
                        _ => unreachable!("ready node not pending"),
                    };
                    break (id, task);
                }
                shared.ready_cv.wait(&mut inner);
            }
        };

        let result = task();

        let mut inner = shared.inner.lock();
        match result {
            Ok(()) => {
                // The node is gone if a concurrent failure cleared the graph
                // while this op was running.
                let dependents = match inner.nodes.get_mut(&id) {
                    Some(node) => {
                        node.state = NodeState::Done;
                        std::mem::take(&mut node.dependents)
                    }
                    None => Vec::new(),
                };
                let mut woke = 0;
                for dep_id in dependents {
                    if let Some(dep) = inner.nodes.get_mut(&dep_id) {
                        dep.unmet -= 1;
                        if dep.unmet == 0 {
                            inner.ready.push_back(dep_id);
                            woke += 1;
                        }
                    }
                }
                drop(inner);
                for _ in 0..woke {
                    shared.ready_cv.notify_one();
                }
                shared.done_cv.notify_all();
            }
            Err(err) => {
                if inner.failure.is_none() {
                    if let Some(node) = inner.nodes.get(&id) {
                        inner.failure = Some((node.desc, err.to_string()));
                    }
                }
                // Nothing queued behind a failure may run.
                inner.nodes.clear();
                inner.ready.clear();
                drop(inner);
                shared.done_cv.notify_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn desc(kind: OpKind) -> OpDesc {
        OpDesc {
            kind,
            block_row: 0,
            block_col: 0,
        }
    }

    #[test]
    fn test_dependencies_order_execution() {
        let dispatcher = Dispatcher::new(4);
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = Arc::clone(&log);
        let first = dispatcher.submit(desc(OpKind::FactorizeDiagonal), &[], move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            l.lock().push(1);
            Ok(())
        });
        let l = Arc::clone(&log);
        let second = dispatcher.submit(desc(OpKind::UpdateRowPanel), &[first], move || {
            l.lock().push(2);
            Ok(())
        });
        let l = Arc::clone(&log);
        let third = dispatcher.submit(desc(OpKind::UpdateTrailing), &[second], move || {
            l.lock().push(3);
            Ok(())
        });

        dispatcher.wait(third).unwrap();
        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_independent_ops_run_concurrently() {
        let dispatcher = Dispatcher::new(2);
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                dispatcher.submit(desc(OpKind::UpdateTrailing), &[], move || {
                    // Deadlocks unless both ops are in flight at once.
                    barrier.wait();
                    Ok(())
                })
            })
            .collect();
        dispatcher.wait_all(&handles).unwrap();
    }

    #[test]
    fn test_retired_handle_counts_as_satisfied() {
        let dispatcher = Dispatcher::new(1);
        let first = dispatcher.submit(desc(OpKind::FactorizeDiagonal), &[], || Ok(()));
        dispatcher.wait(first).unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let second = dispatcher.submit(desc(OpKind::UpdateRowPanel), &[first], move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        dispatcher.wait(second).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_poisons_pending_waits() {
        let dispatcher = Dispatcher::new(1);
        let failing = dispatcher.submit(
            OpDesc {
                kind: OpKind::FactorizeDiagonal,
                block_row: 3,
                block_col: 3,
            },
            &[],
            || {
                Err(Error::Internal("kernel fault".into()))
            },
        );
        let never = dispatcher.submit(desc(OpKind::UpdateTrailing), &[failing], || {
            panic!("must not run after a failure")
        });

        let err = dispatcher.wait(never).unwrap_err();
        match err {
            Error::Accelerator {
                kind,
                block_row,
                block_col,
                ..
            } => {
                assert_eq!(kind, OpKind::FactorizeDiagonal);
                assert_eq!((block_row, block_col), (3, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(dispatcher.wait(failing).is_err());
    }

    #[test]
    fn test_diamond_dependency() {
        let dispatcher = Dispatcher::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let root = dispatcher.submit(desc(OpKind::FactorizeDiagonal), &[], move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let mids: Vec<_> = (0..2)
            .map(|_| {
                let c = Arc::clone(&counter);
                dispatcher.submit(desc(OpKind::UpdateRowPanel), &[root], move || {
                    assert!(c.load(Ordering::SeqCst) >= 1);
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        let c = Arc::clone(&counter);
        let join = dispatcher.submit(desc(OpKind::UpdateTrailing), &mids, move || {
            assert_eq!(c.load(Ordering::SeqCst), 3);
            Ok(())
        });
        dispatcher.wait(join).unwrap();
    }
}
