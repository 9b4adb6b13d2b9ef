//! The queue-driven worker pool.
//!
//! [`ThreadPool`] accepts an open-ended stream of independent work units and
//! drains them in FIFO order on a mix of core workers (resident until
//! termination) and seasonal workers (retire after a bounded idle timeout).
//! Workers are created on demand, one at a time, whenever work arrives and
//! nobody is idle, up to the configured ceiling.

mod worker;

use crate::{
    error::TaskError,
    runnable::{Runnable, WorkUnit},
    worker::{WorkerContext, WorkerState},
};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::debug;

/// State shared between the pool facade and its workers.
#[derive(Debug)]
pub(crate) struct PoolShared {
    /// FIFO of accepted units; popped units belong to the popping worker.
    pub(crate) queue: Mutex<VecDeque<WorkUnit>>,
    /// Signals enqueue, start, and termination.
    pub(crate) work_available: Condvar,
    /// Cooperative stop flag.
    pub(crate) termination: AtomicBool,
    /// While set, workers stay parked in `Delay` and the queue only grows.
    pub(crate) wait_for_start: AtomicBool,
}

/// Configures and builds a [`ThreadPool`].
///
/// Defaults: two core workers, no ceiling, a sixty-second seasonal lifetime,
/// and immediate execution (no start signal required).
#[derive(Debug, Clone)]
pub struct ThreadPoolBuilder {
    core_count: usize,
    max_count: usize,
    seasonal_lifetime: Duration,
    wait_for_start: bool,
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self {
            core_count: 2,
            max_count: 0,
            seasonal_lifetime: Duration::from_secs(60),
            wait_for_start: false,
        }
    }
}

impl ThreadPoolBuilder {
    /// Number of permanently resident workers.
    #[must_use]
    pub fn core_threads(mut self, count: usize) -> Self {
        self.core_count = count;
        self
    }

    /// Ceiling on simultaneously existing workers; `0` means unlimited.
    #[must_use]
    pub fn max_threads(mut self, count: usize) -> Self {
        self.max_count = count;
        self
    }

    /// Idle time after which a seasonal worker retires.
    #[must_use]
    pub fn seasonal_lifetime(mut self, lifetime: Duration) -> Self {
        self.seasonal_lifetime = lifetime;
        self
    }

    /// Keep accepted work parked until [`ThreadPool::start`] is called.
    #[must_use]
    pub fn wait_for_start(mut self, wait: bool) -> Self {
        self.wait_for_start = wait;
        self
    }

    /// Build the pool.
    #[must_use]
    pub fn build(self) -> ThreadPool {
        ThreadPool::with_config(self, false)
    }
}

/// Dynamic pool of worker threads draining a FIFO queue.
///
/// Units are dispatched in acceptance order; concurrent workers race, so the
/// observed completion order is non-deterministic. The pool owns every
/// accepted unit and the worker that ran a unit destroys it.
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
/// use taskgraph::pool::ThreadPool;
///
/// let mut pool = ThreadPool::fixed(2);
/// let done = Arc::new(AtomicU32::new(0));
/// for _ in 0..8 {
///     let done = Arc::clone(&done);
///     assert!(pool.push_fn(move || {
///         done.fetch_add(1, Ordering::Relaxed);
///     }));
/// }
/// pool.start();
/// pool.wait()?;
/// assert_eq!(done.load(Ordering::Relaxed), 8);
/// # Ok::<(), taskgraph::error::TaskError>(())
/// ```
#[derive(Debug)]
pub struct ThreadPool {
    core_count: usize,
    max_count: usize,
    seasonal_lifetime: Duration,
    fixed: bool,
    next_worker_id: u32,
    shared: Arc<PoolShared>,
    workers: Vec<WorkerContext>,
}

impl ThreadPool {
    /// Start configuring a pool.
    #[must_use]
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::default()
    }

    /// A pool of exactly `core_size` workers that parks accepted work until
    /// [`start`](Self::start) and whose workers all retire once the queue
    /// drains.
    #[must_use]
    pub fn fixed(core_size: usize) -> Self {
        let config = ThreadPoolBuilder {
            core_count: core_size,
            max_count: core_size,
            seasonal_lifetime: Duration::ZERO,
            wait_for_start: true,
        };
        Self::with_config(config, true)
    }

    fn with_config(config: ThreadPoolBuilder, fixed: bool) -> Self {
        Self {
            core_count: config.core_count,
            max_count: config.max_count,
            seasonal_lifetime: config.seasonal_lifetime,
            fixed,
            next_worker_id: 0,
            shared: Arc::new(PoolShared {
                queue: Mutex::new(VecDeque::new()),
                work_available: Condvar::new(),
                termination: AtomicBool::new(false),
                wait_for_start: AtomicBool::new(config.wait_for_start),
            }),
            workers: Vec::new(),
        }
    }

    /// Hand a unit of work to the pool.
    ///
    /// Returns false if the pool is not currently [`executable`](Self::executable);
    /// on acceptance, ownership of the unit transfers to the pool. Retired
    /// workers are swept here, and a fresh worker is spawned when no idle
    /// worker exists and the ceiling permits.
    pub fn push<R: Runnable + 'static>(&mut self, runnable: R) -> bool {
        self.push_boxed(Box::new(runnable))
    }

    /// Convenience: accept an infallible closure.
    pub fn push_fn<F>(&mut self, mut body: F) -> bool
    where
        F: FnMut() + Send + 'static,
    {
        self.push_boxed(Box::new(move || -> anyhow::Result<()> {
            body();
            Ok(())
        }))
    }

    fn push_boxed(&mut self, body: Box<dyn Runnable>) -> bool {
        if !self.executable() {
            return false;
        }
        self.sweep_retired_workers();
        if self.workers.len() < self.max_count || self.max_count == 0 {
            let any_idle = self
                .workers
                .iter()
                .any(|context| context.state() == WorkerState::Ready);
            if !any_idle {
                self.spawn_worker();
            }
        }
        let mut queue = self.shared.queue.lock();
        queue.push_back(WorkUnit::new(body));
        self.shared.work_available.notify_one();
        true
    }

    /// Release parked workers and accept work again after a termination.
    pub fn start(&mut self) {
        self.shared.wait_for_start.store(false, Ordering::Release);
        self.shared.termination.store(false, Ordering::Release);
        // Broadcast under the queue lock so a worker between its predicate
        // check and its wait cannot miss the signal.
        let _queue = self.shared.queue.lock();
        self.shared.work_available.notify_all();
    }

    /// Ask workers to stop at the next safe point.
    ///
    /// In-flight bodies finish; queued units are left undisturbed (use
    /// [`clear`](Self::clear) to destroy them). With `also_wait` the call
    /// blocks until all workers drained.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`wait`](Self::wait) when `also_wait` is set.
    pub fn terminate(&mut self, also_wait: bool) -> Result<(), TaskError> {
        self.shared.termination.store(true, Ordering::Release);
        {
            let _queue = self.shared.queue.lock();
            self.shared.work_available.notify_all();
        }
        if also_wait {
            self.wait()?;
        }
        Ok(())
    }

    /// Harvest every worker's completion signal, join the threads, and reset
    /// the pool for reuse.
    ///
    /// After the reset the pool accepts work again but parks it until
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`TaskError::Runtime`] aggregating every captured body failure,
    /// newline-separated.
    pub fn wait(&mut self) -> Result<(), TaskError> {
        self.sweep_retired_workers();
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

    /// Destroy every queued unit that has not been handed to a worker.
    /// Does not affect workers or units already running.
    pub fn clear(&mut self) {
        self.shared.queue.lock().clear();
    }

    /// True iff no queued unit awaits a worker.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.shared.queue.lock().is_empty()
    }

    /// True iff the pool currently accepts work.
    ///
    /// Clear termination flag; for a [`fixed`](Self::fixed) pool,
    /// additionally either the start signal is still pending or at least one
    /// worker record exists.
    #[must_use]
    pub fn executable(&self) -> bool {
        if self.shared.termination.load(Ordering::Acquire) {
            return false;
        }
        if !self.fixed {
            return true;
        }
        self.shared.wait_for_start.load(Ordering::Acquire) || !self.workers.is_empty()
    }

    /// Workers that have not yet retired.
    #[must_use]
    pub fn alive_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|context| context.state() != WorkerState::Completed)
            .count()
    }

    /// Worker records currently tracked, including retired workers not yet
    /// swept.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(&mut self) {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        let shared = Arc::clone(&self.shared);
        let context = if self.fixed || self.workers.len() >= self.core_count {
            let lifetime = self.seasonal_lifetime;
            WorkerContext::spawn(id, format!("pool-worker-{id}"), move |state, signal| {
                worker::run_seasonal(id, &shared, &state, &signal, lifetime);
            })
        } else {
            WorkerContext::spawn(id, format!("pool-worker-{id}"), move |state, signal| {
                worker::run_core(id, &shared, &state, &signal);
            })
        };
        self.workers.push(context);
    }

    /// Join and drop workers that exited cleanly.
    fn sweep_retired_workers(&mut self) {
        self.workers.retain_mut(|context| {
            if context.state() == WorkerState::Completed {
                context.join();
                debug!(worker = context.id, "retired pool worker");
                false
            } else {
                true
            }
        });
    }

    fn reset(&mut self) {
        self.shared.termination.store(false, Ordering::Release);
        self.shared.wait_for_start.store(true, Ordering::Release);
        self.sweep_retired_workers();
        self.workers.clear();
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        ThreadPoolBuilder::default().build()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let _ = self.terminate(true);
        self.clear();
    }
}
