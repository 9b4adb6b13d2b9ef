//! The graph worker loop.

use super::{
    trace::{trace_ready_node, Trace},
    GraphCore,
};
use crate::{
    node::Node,
    types::RunState,
    worker::{run_body_guarded, WorkerOutcome, WorkerState, WorkerStateCell},
};
use std::sync::{atomic::Ordering, mpsc::Sender, Arc};
use tracing::{debug, trace};

/// Thread entry point for a graph worker.
pub(super) fn run(
    id: u32,
    core: &Arc<GraphCore>,
    state: &WorkerStateCell,
    signal: &Sender<WorkerOutcome>,
) {
    state.store(WorkerState::Busy);
    let outcome = run_loop(id, core);
    match &outcome {
        Ok(()) => {
            state.store(WorkerState::Completed);
            debug!(worker = id, "graph worker exited");
        }
        Err(failure) => {
            // One failing body aborts the run: successors must not start
            // once the flag is up.
            core.termination.store(true, Ordering::Release);
            debug!(worker = id, error = %failure.0, "graph worker failed");
        }
    }
    {
        // Final broadcast under the tasks lock: a peer between its resolver
        // query and its wait must not sleep through this worker's exit.
        let _tasks = core.tasks.lock();
        core.task_available.notify_all();
    }
    let _ = signal.send(outcome);
}

fn run_loop(id: u32, core: &GraphCore) -> WorkerOutcome {
    let mut hint: Option<Arc<Node>> = None;
    loop {
        if core.termination.load(Ordering::Acquire) {
            break;
        }
        let claimed = {
            let mut tasks = core.tasks.lock();
            match trace_ready_node(&tasks, hint.as_ref()) {
                Trace::Ready(node) => {
                    node.set_state(RunState::Executing);
                    tasks.prune_ready(&node);
                    Some(node)
                }
                Trace::Pending(blocker) => {
                    // Park until a peer completes a node or termination is
                    // broadcast, then retry from the blocker.
                    core.task_available.wait(&mut tasks);
                    hint = Some(blocker);
                    None
                }
                Trace::Completed(_) => break,
            }
        };
        let Some(node) = claimed else { continue };
        trace!(worker = id, "claimed a task");
        run_body_guarded(|| node.run_body())?;
        node.set_state(RunState::Completed);
        core.task_available.notify_all();
        hint = Some(node);
    }
    Ok(())
}
