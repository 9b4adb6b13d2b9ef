//! The dependency-graph executor.
//!
//! [`TaskGraph`] owns a set of nodes connected by precedence edges and runs
//! them on a bounded set of worker threads. Each worker repeatedly consults
//! the ready-node resolver under the engine-wide tasks mutex, claims the
//! returned node, runs its body outside the lock, and broadcasts completion
//! so blocked peers re-examine the graph.

mod trace;
mod worker;

use crate::{
    error::TaskError,
    handle::TaskHandle,
    node::{self, Node},
    runnable::Runnable,
    types::{RunState, WaitStatus},
    worker::WorkerContext,
};
use parking_lot::{Condvar, Mutex};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::debug;

const DEFAULT_THREAD_COUNT: usize = 2;

/// State shared between the engine facade and every graph worker.
#[derive(Debug)]
pub(crate) struct GraphCore {
    /// Node pool and ready cache, guarded by the engine-wide tasks mutex.
    pub(crate) tasks: Mutex<TaskSet>,
    /// Signals new-work availability, node completion, and termination.
    pub(crate) task_available: Condvar,
    /// Cooperative stop flag observed by workers at safe points.
    pub(crate) termination: AtomicBool,
    /// True between `start` and the drain performed by `wait`.
    pub(crate) executing: AtomicBool,
}

/// The graph's node set together with the per-run ready cache.
#[derive(Debug, Default)]
pub(crate) struct TaskSet {
    /// Every node owned by the graph, in push order.
    pub(crate) pool: Vec<Arc<Node>>,
    /// Candidate starting points not yet dispatched in the current run.
    pub(crate) ready_cache: Vec<Arc<Node>>,
}

impl TaskSet {
    /// Drop a dispatched node from the ready cache.
    pub(crate) fn prune_ready(&mut self, node: &Arc<Node>) {
        self.ready_cache
            .retain(|candidate| !Arc::ptr_eq(candidate, node));
    }
}

/// Multi-threaded executor for a directed acyclic graph of tasks.
///
/// Tasks are pushed as [`Runnable`] bodies and wired together through the
/// returned [`TaskHandle`]s. [`start`](Self::start) spawns the workers,
/// [`wait`](Self::wait) drains them and surfaces any body failures, and the
/// graph can then be started again: node states are reset on every run.
///
/// A node's body runs strictly after every one of its predecessors' bodies
/// has returned. One failing body aborts the run: the termination flag goes
/// up, pending workers exit without claiming further nodes, and
/// [`wait`](Self::wait) returns the aggregated failure.
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
/// use taskgraph::graph::TaskGraph;
///
/// let mut graph = TaskGraph::new(4, true);
/// let total = Arc::new(AtomicU32::new(0));
///
/// let counter = Arc::clone(&total);
/// let first = graph.push_fn(move || {
///     counter.fetch_add(1, Ordering::Relaxed);
/// })?;
/// let counter = Arc::clone(&total);
/// let second = graph.push_fn(move || {
///     counter.fetch_add(2, Ordering::Relaxed);
/// })?;
/// second.depend(&first)?;
///
/// graph.start()?;
/// graph.wait()?;
/// assert_eq!(total.load(Ordering::Relaxed), 3);
/// # Ok::<(), taskgraph::error::TaskError>(())
/// ```
#[derive(Debug)]
pub struct TaskGraph {
    thread_count: usize,
    optimized_threads: bool,
    next_worker_id: u32,
    core: Arc<GraphCore>,
    workers: Vec<WorkerContext>,
}

impl TaskGraph {
    /// Create a graph executor.
    ///
    /// `thread_count` is the number of workers [`start`](Self::start) spawns
    /// (at least one). With `optimized_threads`, the spawned count is clamped
    /// to the number of tasks so tiny graphs do not pay for idle threads.
    #[must_use]
    pub fn new(thread_count: usize, optimized_threads: bool) -> Self {
        Self {
            thread_count: thread_count.max(1),
            optimized_threads,
            next_worker_id: 0,
            core: Arc::new(GraphCore {
                tasks: Mutex::new(TaskSet::default()),
                task_available: Condvar::new(),
                termination: AtomicBool::new(false),
                executing: AtomicBool::new(false),
            }),
            workers: Vec::new(),
        }
    }

    /// Add a task to the graph and return a handle to it.
    ///
    /// The graph takes ownership of the body; duplicate pushes of one unit
    /// cannot arise because the node is constructed here.
    ///
    /// # Errors
    ///
    /// [`TaskError::Runtime`] if called while the graph is executing.
    pub fn push<R: Runnable + 'static>(&mut self, runnable: R) -> Result<TaskHandle, TaskError> {
        self.push_boxed(Box::new(runnable))
    }

    /// Add an infallible closure as a task.
    ///
    /// # Errors
    ///
    /// [`TaskError::Runtime`] if called while the graph is executing.
    pub fn push_fn<F>(&mut self, mut body: F) -> Result<TaskHandle, TaskError>
    where
        F: FnMut() + Send + 'static,
    {
        self.push_boxed(Box::new(move || -> anyhow::Result<()> {
            body();
            Ok(())
        }))
    }

    fn push_boxed(&mut self, body: Box<dyn Runnable>) -> Result<TaskHandle, TaskError> {
        if self.executing() {
            return Err(TaskError::runtime(
                "cannot push tasks while the graph is executing",
            ));
        }
        let node = Node::new(body);
        let handle = TaskHandle::new(&node);
        self.core.tasks.lock().pool.push(node);
        Ok(handle)
    }

    /// Remove a task from the graph, dropping all edges incident to it.
    ///
    /// Returns false if the handle is empty or does not reference a node of
    /// this graph. On success the node is destroyed and every handle to it
    /// becomes empty.
    ///
    /// # Errors
    ///
    /// [`TaskError::Runtime`] if called while the graph is executing.
    pub fn erase(&mut self, handle: &TaskHandle) -> Result<bool, TaskError> {
        if self.executing() {
            return Err(TaskError::runtime(
                "cannot erase tasks while the graph is executing",
            ));
        }
        let Some(target) = handle.node.upgrade() else {
            return Ok(false);
        };
        let mut tasks = self.core.tasks.lock();
        let Some(position) = tasks
            .pool
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, &target))
        else {
            return Ok(false);
        };
        for predecessor in target.predecessors() {
            node::unlink(&mut predecessor.links().successors, &target);
        }
        for successor in target.successors() {
            node::unlink(&mut successor.links().predecessors, &target);
        }
        tasks.pool.remove(position);
        Ok(true)
    }

    /// Destroy every task, resetting the graph to an empty state.
    ///
    /// All outstanding handles become empty. Callers should drain a running
    /// execution with [`wait`](Self::wait) first.
    pub fn clear(&mut self) {
        self.reset();
        self.core.tasks.lock().pool.clear();
    }

    /// Spawn workers and begin executing the graph.
    ///
    /// Any previous execution is drained first (propagating its failures),
    /// all node states are reset to `Ready`, and the ready cache is seeded
    /// with the full node set.
    ///
    /// # Errors
    ///
    /// [`TaskError::Runtime`] if the graph is already executing, or if the
    /// drained previous execution had failed.
    pub fn start(&mut self) -> Result<(), TaskError> {
        if self.executing() {
            return Err(TaskError::runtime(
                "cannot start the graph while it is already executing",
            ));
        }
        self.wait()?;
        self.reset();
        let task_count = {
            let mut tasks = self.core.tasks.lock();
            for node in &tasks.pool {
                node.set_state(RunState::Ready);
            }
            tasks.ready_cache = tasks.pool.clone();
            tasks.pool.len()
        };
        self.core.executing.store(true, Ordering::Release);
        let worker_count = if self.optimized_threads {
            self.thread_count.min(task_count)
        } else {
            self.thread_count
        };
        debug!(workers = worker_count, tasks = task_count, "starting graph execution");
        for _ in 0..worker_count {
            self.spawn_worker();
        }
        Ok(())
    }

    /// Ask workers to stop at the next safe point.
    ///
    /// In-flight bodies are not interrupted; nodes not yet claimed stay
    /// unexecuted. With `also_wait` the call blocks until workers drained.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`wait`](Self::wait) when `also_wait` is set.
    pub fn terminate(&mut self, also_wait: bool) -> Result<(), TaskError> {
        self.core.termination.store(true, Ordering::Release);
        {
            // Broadcast under the tasks lock so a worker between its resolver
            // query and its wait cannot miss the signal.
            let _tasks = self.core.tasks.lock();
            self.core.task_available.notify_all();
        }
        if also_wait {
            self.wait()?;
        }
        Ok(())
    }

    /// Wait for every worker to finish, join the threads, and reset the
    /// engine for the next run. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// [`TaskError::Runtime`] aggregating every captured body failure,
    /// newline-separated.
    pub fn wait(&mut self) -> Result<(), TaskError> {
        let mut failures = Vec::new();
        for context in &mut self.workers {
            if let Err(failure) = context.harvest() {
                failures.push(failure.0);
            }
        }
        for context in &mut self.workers {
            context.join();
        }
        self.reset();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TaskError::runtime(format!(
                "failure in worker thread: {}",
                failures.join("\n")
            )))
        }
    }

    /// Wait for completion with a total time budget.
    ///
    /// Each worker's completion signal is awaited against the same deadline;
    /// if any signal is still unresolved when the budget runs out, the call
    /// returns [`WaitStatus::Timeout`] without raising and without resetting
    /// the engine. Otherwise it delegates to [`wait`](Self::wait) and returns
    /// [`WaitStatus::Ready`].
    ///
    /// # Errors
    ///
    /// Propagates failures from [`wait`](Self::wait).
    pub fn wait_for(&mut self, timeout: Duration) -> Result<WaitStatus, TaskError> {
        let deadline = Instant::now() + timeout;
        for context in &mut self.workers {
            if !context.await_signal_until(deadline) {
                return Ok(WaitStatus::Timeout);
            }
        }
        self.wait()?;
        Ok(WaitStatus::Ready)
    }

    /// True while an execution is in flight (between
    /// [`start`](Self::start) and the drain performed by
    /// [`wait`](Self::wait)).
    #[must_use]
    pub fn executing(&self) -> bool {
        self.core.executing.load(Ordering::Acquire)
    }

    /// True iff the graph contains no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.tasks.lock().pool.is_empty()
    }

    /// Number of tasks currently in the graph.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.core.tasks.lock().pool.len()
    }

    /// Handle to the task at `index` in push order, if any.
    #[must_use]
    pub fn task_at(&self, index: usize) -> Option<TaskHandle> {
        self.core.tasks.lock().pool.get(index).map(TaskHandle::new)
    }

    /// Handles to every task, in push order.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.core
            .tasks
            .lock()
            .pool
            .iter()
            .map(TaskHandle::new)
            .collect()
    }

    /// Number of worker records of the current run. Populated by
    /// [`start`](Self::start), cleared by [`wait`](Self::wait).
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers the next [`start`](Self::start) will spawn (before
    /// the optimized-threads clamp).
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Change the worker count used by subsequent runs (at least one).
    pub fn set_thread_count(&mut self, thread_count: usize) {
        self.thread_count = thread_count.max(1);
    }

    /// Whether the worker count is clamped to the task count.
    #[must_use]
    pub fn optimized_threads(&self) -> bool {
        self.optimized_threads
    }

    /// Enable or disable clamping the worker count to the task count.
    pub fn set_optimized_threads(&mut self, optimized: bool) {
        self.optimized_threads = optimized;
    }

    fn spawn_worker(&mut self) {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        let core = Arc::clone(&self.core);
        let context = WorkerContext::spawn(id, format!("graph-worker-{id}"), move |state, signal| {
            worker::run(id, &core, &state, &signal);
        });
        self.workers.push(context);
    }

    fn reset(&mut self) {
        self.core.executing.store(false, Ordering::Release);
        self.core.termination.store(false, Ordering::Release);
        self.core.tasks.lock().ready_cache.clear();
        self.workers.clear();
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new(DEFAULT_THREAD_COUNT, true)
    }
}

impl Drop for TaskGraph {
    fn drop(&mut self) {
        // Cooperatively stop and drain workers; failures have nowhere to go.
        let _ = self.terminate(true);
    }
}
