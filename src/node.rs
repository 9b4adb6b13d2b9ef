use crate::{
    runnable::Runnable,
    types::{RunState, RunStateCell},
};
use derive_more::Debug;
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Weak};

/// A work unit wired into the dependency graph.
///
/// Nodes are owned exclusively by their graph: the engine's task pool holds
/// the only strong references, while adjacency lists and handles hold `Weak`
/// back-references. Erasing a node or clearing the graph therefore releases
/// it immediately, and every outstanding handle observes the removal.
#[derive(Debug)]
pub(crate) struct Node {
    state: RunStateCell,
    #[debug(skip)]
    body: Mutex<Box<dyn Runnable>>,
    links: Mutex<Links>,
}

/// Ordered adjacency of a node. Insertion order is preserved so iteration is
/// deterministic.
#[derive(Debug, Default)]
pub(crate) struct Links {
    pub(crate) predecessors: Vec<Weak<Node>>,
    pub(crate) successors: Vec<Weak<Node>>,
}

impl Node {
    pub(crate) fn new(body: Box<dyn Runnable>) -> Arc<Self> {
        Arc::new(Self {
            state: RunStateCell::new(),
            body: Mutex::new(body),
            links: Mutex::new(Links::default()),
        })
    }

    pub(crate) fn state(&self) -> RunState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: RunState) {
        self.state.store(state);
    }

    /// Run the user body.
    ///
    /// The body lock is never contended: the `Executing` transition under the
    /// graph's tasks mutex guarantees a single claimant per cycle.
    pub(crate) fn run_body(&self) -> anyhow::Result<()> {
        self.body.lock().run()
    }

    pub(crate) fn links(&self) -> MutexGuard<'_, Links> {
        self.links.lock()
    }

    /// Upgraded predecessors in insertion order.
    pub(crate) fn predecessors(&self) -> Vec<Arc<Node>> {
        self.links
            .lock()
            .predecessors
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Upgraded successors in insertion order.
    pub(crate) fn successors(&self) -> Vec<Arc<Node>> {
        self.links
            .lock()
            .successors
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Stable address used as node identity in visited and avoid sets.
    pub(crate) fn key(this: &Arc<Node>) -> usize {
        Arc::as_ptr(this) as usize
    }
}

/// True if `weak` references the same node as `node`.
pub(crate) fn refers_to(weak: &Weak<Node>, node: &Arc<Node>) -> bool {
    core::ptr::eq(weak.as_ptr(), Arc::as_ptr(node))
}

/// Append an edge to `node` unless one is already present.
pub(crate) fn link_unique(edges: &mut Vec<Weak<Node>>, node: &Arc<Node>) {
    if !edges.iter().any(|weak| refers_to(weak, node)) {
        edges.push(Arc::downgrade(node));
    }
}

/// Remove every edge referencing `node`.
pub(crate) fn unlink(edges: &mut Vec<Weak<Node>>, node: &Arc<Node>) {
    edges.retain(|weak| !refers_to(weak, node));
}
