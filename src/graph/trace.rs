//! Ready-node discovery.
//!
//! The resolver is a pure function of the current node states: given the
//! node a worker just dealt with (the hint), it either hands back the next
//! node that worker should run, names the node blocking progress so the
//! worker can park on the task-available condition, or reports that nothing
//! runnable remains. Because it reads only states and adjacency, it can be
//! exercised by planting nodes in arbitrary states without spawning a single
//! worker.

use super::TaskSet;
use crate::{node::Node, types::RunState};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Outcome of a resolver query.
#[derive(Debug, Clone)]
pub(crate) enum Trace {
    /// The node may be claimed and run right away.
    Ready(Arc<Node>),
    /// Nothing runnable from this vantage point; the payload is the blocking
    /// node, which the caller should use as its next hint after waking.
    Pending(Arc<Node>),
    /// The walked region (helper) or the whole graph (top level) is done.
    Completed(Option<Arc<Node>>),
}

/// Walk the predecessor cone of `entry` depth-first, skipping predecessors
/// in `avoids`, and report the deepest runnable ancestor, or else the
/// blocker that makes `entry` unrunnable.
///
/// A `Ready` result short-circuits the sweep; a `Pending` ancestor is
/// remembered but scanning continues, because a runnable branch elsewhere in
/// the cone still wins.
pub(crate) fn trace_ready_depend(entry: &Arc<Node>, avoids: &FxHashSet<usize>) -> Trace {
    match entry.state() {
        RunState::Executing => Trace::Pending(Arc::clone(entry)),
        RunState::Completed => Trace::Completed(Some(Arc::clone(entry))),
        RunState::Ready => {
            let mut blocked = None;
            for predecessor in entry.predecessors() {
                if avoids.contains(&Node::key(&predecessor)) {
                    continue;
                }
                match predecessor.state() {
                    RunState::Ready => match trace_ready_depend(&predecessor, avoids) {
                        ready @ Trace::Ready(_) => return ready,
                        Trace::Pending(blocker) => blocked = Some(blocker),
                        Trace::Completed(_) => {}
                    },
                    RunState::Executing => blocked = Some(predecessor),
                    RunState::Completed => {}
                }
            }
            match blocked {
                Some(blocker) => Trace::Pending(blocker),
                None => Trace::Ready(Arc::clone(entry)),
            }
        }
    }
}

/// Find the next node for a worker whose last dispatched node is `hint`.
///
/// A worker that just finished a node very likely unblocked one of its
/// successors, so the search starts there and only falls back to a sweep
/// from the ready cache. `None` means the worker is starting fresh.
pub(crate) fn trace_ready_node(tasks: &TaskSet, hint: Option<&Arc<Node>>) -> Trace {
    let avoids = FxHashSet::default();
    let Some(hint) = hint else {
        return trace_from_cache(tasks, &avoids);
    };
    match hint.state() {
        RunState::Executing => {
            // The hint is still running on a peer; its ready successors are
            // the most local candidates.
            for successor in ready_successors(hint) {
                if let ready @ Trace::Ready(_) = trace_ready_depend(&successor, &avoids) {
                    return ready;
                }
            }
            match trace_from_cache(tasks, &avoids) {
                ready @ Trace::Ready(_) => ready,
                _ => Trace::Pending(Arc::clone(hint)),
            }
        }
        RunState::Ready => match trace_ready_depend(hint, &avoids) {
            ready @ Trace::Ready(_) => ready,
            pending @ Trace::Pending(_) => match trace_from_cache(tasks, &avoids) {
                ready @ Trace::Ready(_) => ready,
                _ => pending,
            },
            Trace::Completed(_) => Trace::Completed(None),
        },
        RunState::Completed => {
            let mut delayed = None;
            for successor in ready_successors(hint) {
                match trace_ready_depend(&successor, &avoids) {
                    ready @ Trace::Ready(_) => return ready,
                    Trace::Pending(blocker) => delayed = Some(blocker),
                    Trace::Completed(_) => {}
                }
            }
            match trace_from_cache(tasks, &avoids) {
                ready @ Trace::Ready(_) => ready,
                Trace::Pending(blocker) => Trace::Pending(delayed.unwrap_or(blocker)),
                Trace::Completed(_) => match delayed {
                    Some(blocker) => Trace::Pending(blocker),
                    None => Trace::Completed(None),
                },
            }
        }
    }
}

/// Hint-less search: sweep from the front of the ready cache, else report a
/// still-running node, else declare the graph drained.
fn trace_from_cache(tasks: &TaskSet, avoids: &FxHashSet<usize>) -> Trace {
    if let Some(first) = tasks.ready_cache.first() {
        return trace_ready_depend(first, avoids);
    }
    for node in &tasks.pool {
        if node.state() == RunState::Executing {
            return Trace::Pending(Arc::clone(node));
        }
    }
    Trace::Completed(None)
}

fn ready_successors(node: &Arc<Node>) -> Vec<Arc<Node>> {
    node.successors()
        .into_iter()
        .filter(|successor| successor.state() == RunState::Ready)
        .collect()
}
