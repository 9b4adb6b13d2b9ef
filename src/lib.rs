//! Thread-backed executors for dependency graphs and dynamic worker pools.
//!
//! This crate provides two orthogonal engines for running user-supplied work
//! on OS threads:
//! - [`graph::TaskGraph`] executes a directed acyclic graph (DAG) of tasks,
//!   dispatching a node to a worker only once every predecessor has
//!   completed. Workers discover ready nodes through a hint-guided resolver
//!   that favors the successors of whatever they just finished, falling back
//!   to a cache sweep so progress is always made.
//! - [`pool::ThreadPool`] drains a FIFO queue of independent units on a mix
//!   of core workers (resident until termination) and seasonal workers
//!   (retire after a bounded idle timeout), growing on demand up to a
//!   configured ceiling.
//!
//! Key modules:
//! - `runnable`: the [`runnable::Runnable`] work-unit trait; fallible
//!   closures implement it directly.
//! - `handle`: [`handle::TaskHandle`], the cloneable non-owning reference
//!   used to declare precedence edges and inspect nodes.
//! - `graph`: the DAG engine (push, wire, `start`, `wait`).
//! - `pool`: the queue engine (push, `start`, `terminate`, `wait`).
//! - `error` / `types`: the two-kind error surface, lifecycle states, and
//!   timed-wait status.
//!
//! Quick start:
//! 1. Build a [`graph::TaskGraph`] and `push` bodies into it; wire edges via
//!    the returned handles (`b.depend(&a)` makes `b` wait for `a`).
//! 2. Call `start` to spawn workers, then `wait` to drain them. Failures
//!    thrown by bodies abort the run, skip all successors, and surface from
//!    `wait` as a single aggregated error.
//! 3. The graph is reusable: every `start` resets node states and runs the
//!    whole DAG again.
//!
//! Cancellation is cooperative everywhere: `terminate` raises a flag and
//! broadcasts, workers observe it before claiming further work, and bodies
//! already in flight run to completion.

/// The two-kind error surface of both engines.
pub mod error;
/// The dependency-graph executor.
///
/// Owns the node set, spawns workers on `start`, and coordinates dispatch
/// through the ready-node resolver, termination, and timed waits.
pub mod graph;
/// Non-owning task handles used to declare precedence edges and query nodes.
pub mod handle;
mod node;
/// The queue-driven worker pool with core and seasonal workers.
pub mod pool;
/// The work-unit trait accepted by both engines.
pub mod runnable;
/// Lifecycle states and timed-wait status shared across the crate.
pub mod types;
mod worker;
