//! Generation reuse discipline under in-flight readers
//!
//! Drives the acquire/refill/release cycle the scheduler uses, with slow
//! reader operations standing in for trailing updates, and checks that a
//! generation's buffers are never refilled while an operation reading them is
//! still in flight. Each refill stamps the step number into the buffer;
//! every reader records what it saw at execution time.

mod common;

use gridlu::dispatch::{Dispatcher, OpDesc, OpHandle, OpKind};
use gridlu::panels::{generation, PanelBuffers, GENERATIONS};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_refill_waits_for_inflight_readers() {
    let cfg = common::config(32, 4, 2, 2);
    let steps = 8;
    let readers_per_step = 3;

    let dispatcher = Dispatcher::new(2);
    let mut panels = PanelBuffers::<f64>::new(&cfg);
    let mut inflight: [Vec<OpHandle>; GENERATIONS] = [Vec::new(), Vec::new()];
    let observed: Arc<Mutex<Vec<(usize, f64)>>> = Arc::new(Mutex::new(Vec::new()));

    for k in 0..steps {
        let gen = generation(k);
        if k >= GENERATIONS {
            dispatcher.wait_all(&inflight[gen]).unwrap();
            inflight[gen].clear();
            panels.release(k - GENERATIONS);
        }
        panels.acquire(k);
        panels.row_block_mut(gen, 0).fill(k as f64);

        for r in 0..readers_per_step {
            let view = panels.row_view(gen, 0);
            let observed = Arc::clone(&observed);
            let desc = OpDesc {
                kind: OpKind::UpdateTrailing,
                block_row: k,
                block_col: r,
            };
            inflight[gen].push(dispatcher.submit(desc, &[], move || {
                // Slow reader: still running when the scheduler reaches the
                // next step, like a trailing update draining on the
                // accelerator.
                std::thread::sleep(Duration::from_millis(5));
                let seen = unsafe { *(view.ptr as *const f64) };
                observed.lock().push((k, seen));
                Ok(())
            }));
        }
    }
    for k in steps - GENERATIONS..steps {
        let gen = generation(k);
        dispatcher.wait_all(&inflight[gen]).unwrap();
        inflight[gen].clear();
        panels.release(k);
    }

    let observed = observed.lock();
    assert_eq!(observed.len(), steps * readers_per_step);
    for &(step, seen) in observed.iter() {
        assert_eq!(
            seen, step as f64,
            "reader of step {} saw a refilled buffer ({})",
            step, seen
        );
    }
}
