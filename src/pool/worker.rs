//! Core and seasonal pool worker loops.

use super::PoolShared;
use crate::{
    runnable::WorkUnit,
    types::RunState,
    worker::{run_body_guarded, WorkerFailure, WorkerOutcome, WorkerState, WorkerStateCell},
};
use std::{
    sync::{atomic::Ordering, mpsc::Sender},
    time::Duration,
};
use tracing::debug;

/// Thread entry point for a core worker: blocks indefinitely for work.
pub(super) fn run_core(
    id: u32,
    shared: &PoolShared,
    state: &WorkerStateCell,
    signal: &Sender<WorkerOutcome>,
) {
    let outcome = core_loop(shared, state);
    finish(id, state, signal, outcome);
}

/// Thread entry point for a seasonal worker: retires after `lifetime` of
/// idleness.
pub(super) fn run_seasonal(
    id: u32,
    shared: &PoolShared,
    state: &WorkerStateCell,
    signal: &Sender<WorkerOutcome>,
    lifetime: Duration,
) {
    let outcome = seasonal_loop(shared, state, lifetime);
    finish(id, state, signal, outcome);
}

fn finish(id: u32, state: &WorkerStateCell, signal: &Sender<WorkerOutcome>, outcome: WorkerOutcome) {
    match &outcome {
        Ok(()) => {
            state.store(WorkerState::Completed);
            debug!(worker = id, "pool worker exited");
        }
        Err(failure) => {
            debug!(worker = id, error = %failure.0, "pool worker failed");
        }
    }
    let _ = signal.send(outcome);
}

fn core_loop(shared: &PoolShared, state: &WorkerStateCell) -> WorkerOutcome {
    state.store(WorkerState::Delay);
    await_start(shared);
    loop {
        let unit = {
            state.store(WorkerState::Ready);
            let mut queue = shared.queue.lock();
            shared.work_available.wait_while(&mut queue, |queue| {
                !shared.termination.load(Ordering::Acquire) && queue.is_empty()
            });
            state.store(WorkerState::Busy);
            if shared.termination.load(Ordering::Acquire) {
                break;
            }
            queue.pop_front()
        };
        run_unit(unit)?;
    }
    Ok(())
}

fn seasonal_loop(
    shared: &PoolShared,
    state: &WorkerStateCell,
    lifetime: Duration,
) -> WorkerOutcome {
    state.store(WorkerState::Delay);
    await_start(shared);
    loop {
        let unit = {
            state.store(WorkerState::Ready);
            let mut queue = shared.queue.lock();
            let _ = shared.work_available.wait_while_for(
                &mut queue,
                |queue| !shared.termination.load(Ordering::Acquire) && queue.is_empty(),
                lifetime,
            );
            state.store(WorkerState::Busy);
            // An idle timeout leaves the queue empty: retire.
            if shared.termination.load(Ordering::Acquire) || queue.is_empty() {
                break;
            }
            queue.pop_front()
        };
        run_unit(unit)?;
    }
    Ok(())
}

/// Park until the pool's start signal clears. Termination also releases the
/// worker, so a pool that is dropped before `start` still drains.
fn await_start(shared: &PoolShared) {
    let mut queue = shared.queue.lock();
    shared.work_available.wait_while(&mut queue, |_| {
        shared.wait_for_start.load(Ordering::Acquire)
            && !shared.termination.load(Ordering::Acquire)
    });
}

/// Run a popped unit, driving its lifecycle states, and drop it afterwards.
fn run_unit(unit: Option<WorkUnit>) -> Result<(), WorkerFailure> {
    let Some(mut unit) = unit else {
        return Ok(());
    };
    unit.set_state(RunState::Executing);
    run_body_guarded(|| unit.run())?;
    unit.set_state(RunState::Completed);
    Ok(())
}
