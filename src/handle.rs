use crate::{
    error::TaskError,
    node::{self, Node},
    types::RunState,
};
use rustc_hash::FxHashSet;
use std::sync::{Arc, Weak};

/// A lightweight, cloneable, non-owning reference to a graph node.
///
/// Handles are the only way user code touches nodes after a push: they
/// declare precedence edges, query state, and walk adjacency. The referenced
/// node lives exactly as long as its graph keeps it; once the node is erased
/// or the graph is cleared or dropped, every handle to it becomes empty.
///
/// An empty handle (the [`Default`] value, or one whose node is gone) is a
/// first-class value: edge mutations on it fail with
/// [`TaskError::InvalidArgument`], queries report nothing.
///
/// Edges must be declared while the owning graph is not executing; the
/// resolver reads adjacency without further checks once workers run.
///
/// Two handles compare equal iff they reference the same node.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    pub(crate) node: Weak<Node>,
}

impl TaskHandle {
    pub(crate) fn new(node: &Arc<Node>) -> Self {
        Self {
            node: Arc::downgrade(node),
        }
    }

    /// True if this handle references no live node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node.strong_count() == 0
    }

    /// Current lifecycle state of the referenced node, or `None` for an
    /// empty handle.
    #[must_use]
    pub fn state(&self) -> Option<RunState> {
        self.node.upgrade().map(|node| node.state())
    }

    /// Declare that this task runs only after `other` has completed.
    ///
    /// Adding an edge that is already present is a no-op.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidArgument`] if either handle is empty or both
    /// reference the same node; [`TaskError::Runtime`] if the new edge would
    /// close a cycle (i.e. `other` already transitively depends on this
    /// task).
    pub fn depend(&self, other: &TaskHandle) -> Result<(), TaskError> {
        let (node, other_node) = self.edge_endpoints(other)?;
        if reaches_through_predecessors(&other_node, &node) {
            return Err(TaskError::runtime("dependency would close a cycle"));
        }
        node::link_unique(&mut node.links().predecessors, &other_node);
        node::link_unique(&mut other_node.links().successors, &node);
        Ok(())
    }

    /// Declare that `other` runs only after this task has completed.
    ///
    /// Defined as `other.depend(self)`; see [`depend`](Self::depend) for the
    /// failure modes.
    ///
    /// # Errors
    ///
    /// Same as [`depend`](Self::depend).
    pub fn precede(&self, other: &TaskHandle) -> Result<(), TaskError> {
        other.depend(self)
    }

    /// Remove this task's dependency on `other` if present; no-op otherwise
    /// (including on empty handles).
    pub fn erase_depend(&self, other: &TaskHandle) {
        let (Some(node), Some(other_node)) = (self.node.upgrade(), other.node.upgrade()) else {
            return;
        };
        node::unlink(&mut node.links().predecessors, &other_node);
        node::unlink(&mut other_node.links().successors, &node);
    }

    /// Remove `other`'s dependency on this task if present; no-op otherwise.
    pub fn erase_precede(&self, other: &TaskHandle) {
        other.erase_depend(self);
    }

    /// Number of tasks this one waits for.
    #[must_use]
    pub fn predecessor_count(&self) -> usize {
        self.node
            .upgrade()
            .map_or(0, |node| node.links().predecessors.len())
    }

    /// Number of tasks waiting for this one.
    #[must_use]
    pub fn successor_count(&self) -> usize {
        self.node
            .upgrade()
            .map_or(0, |node| node.links().successors.len())
    }

    /// Predecessor handles in insertion order.
    #[must_use]
    pub fn predecessors(&self) -> Vec<TaskHandle> {
        self.node.upgrade().map_or_else(Vec::new, |node| {
            node.links()
                .predecessors
                .iter()
                .map(|weak| Self { node: weak.clone() })
                .collect()
        })
    }

    /// Successor handles in insertion order.
    #[must_use]
    pub fn successors(&self) -> Vec<TaskHandle> {
        self.node.upgrade().map_or_else(Vec::new, |node| {
            node.links()
                .successors
                .iter()
                .map(|weak| Self { node: weak.clone() })
                .collect()
        })
    }

    /// Predecessor at `index` in insertion order, if any.
    #[must_use]
    pub fn predecessor_at(&self, index: usize) -> Option<TaskHandle> {
        self.node.upgrade().and_then(|node| {
            node.links()
                .predecessors
                .get(index)
                .map(|weak| Self { node: weak.clone() })
        })
    }

    /// Successor at `index` in insertion order, if any.
    #[must_use]
    pub fn successor_at(&self, index: usize) -> Option<TaskHandle> {
        self.node.upgrade().and_then(|node| {
            node.links()
                .successors
                .get(index)
                .map(|weak| Self { node: weak.clone() })
        })
    }

    fn edge_endpoints(&self, other: &TaskHandle) -> Result<(Arc<Node>, Arc<Node>), TaskError> {
        let node = self.node.upgrade().ok_or_else(empty_handle)?;
        let other_node = other.node.upgrade().ok_or_else(empty_handle)?;
        if Arc::ptr_eq(&node, &other_node) {
            return Err(TaskError::invalid("a task cannot depend on itself"));
        }
        Ok((node, other_node))
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for TaskHandle {}

fn empty_handle() -> TaskError {
    TaskError::invalid("handle references no node")
}

/// True if `target` appears in the transitive predecessor closure of `from`
/// (including `from` itself).
fn reaches_through_predecessors(from: &Arc<Node>, target: &Arc<Node>) -> bool {
    let mut visited = FxHashSet::default();
    let mut stack = vec![Arc::clone(from)];
    while let Some(current) = stack.pop() {
        if !visited.insert(Node::key(&current)) {
            continue;
        }
        if Arc::ptr_eq(&current, target) {
            return true;
        }
        stack.extend(current.predecessors());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::Runnable;

    fn noop() -> Arc<Node> {
        Node::new(Box::new(|| -> anyhow::Result<()> { Ok(()) }) as Box<dyn Runnable>)
    }

    #[test]
    fn depend_links_both_directions() {
        let (a, b) = (noop(), noop());
        let (ha, hb) = (TaskHandle::new(&a), TaskHandle::new(&b));
        hb.depend(&ha).unwrap();

        assert_eq!(hb.predecessor_count(), 1);
        assert_eq!(ha.successor_count(), 1);
        assert_eq!(hb.predecessor_at(0), Some(ha.clone()));
        assert_eq!(ha.successor_at(0), Some(hb.clone()));
    }

    #[test]
    fn depend_is_idempotent() {
        let (a, b) = (noop(), noop());
        let (ha, hb) = (TaskHandle::new(&a), TaskHandle::new(&b));
        hb.depend(&ha).unwrap();
        hb.depend(&ha).unwrap();

        assert_eq!(hb.predecessor_count(), 1);
        assert_eq!(ha.successor_count(), 1);
    }

    #[test]
    fn erase_depend_restores_counts() {
        let (a, b) = (noop(), noop());
        let (ha, hb) = (TaskHandle::new(&a), TaskHandle::new(&b));
        hb.depend(&ha).unwrap();
        hb.erase_depend(&ha);

        assert_eq!(hb.predecessor_count(), 0);
        assert_eq!(ha.successor_count(), 0);
        // Erasing again is a silent no-op.
        hb.erase_depend(&ha);
    }

    #[test]
    fn self_dependency_is_rejected() {
        let a = noop();
        let ha = TaskHandle::new(&a);
        assert!(matches!(
            ha.depend(&ha.clone()),
            Err(TaskError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_handle_is_rejected() {
        let a = noop();
        let ha = TaskHandle::new(&a);
        let empty = TaskHandle::default();
        assert!(empty.is_empty());
        assert!(matches!(
            ha.depend(&empty),
            Err(TaskError::InvalidArgument(_))
        ));
        assert!(matches!(
            empty.depend(&ha),
            Err(TaskError::InvalidArgument(_))
        ));
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let (a, b) = (noop(), noop());
        let (ha, hb) = (TaskHandle::new(&a), TaskHandle::new(&b));
        ha.depend(&hb).unwrap();
        assert!(matches!(hb.depend(&ha), Err(TaskError::Runtime(_))));
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let (a, b, c) = (noop(), noop(), noop());
        let (ha, hb, hc) = (TaskHandle::new(&a), TaskHandle::new(&b), TaskHandle::new(&c));
        hb.depend(&ha).unwrap();
        hc.depend(&hb).unwrap();
        assert!(matches!(ha.depend(&hc), Err(TaskError::Runtime(_))));
    }

    #[test]
    fn precede_is_the_inverse_of_depend() {
        let (a, b) = (noop(), noop());
        let (ha, hb) = (TaskHandle::new(&a), TaskHandle::new(&b));
        ha.precede(&hb).unwrap();

        assert_eq!(hb.predecessor_at(0), Some(ha.clone()));
        hb.erase_precede(&ha);
        assert_eq!(hb.predecessor_at(0), Some(ha.clone()));
        ha.erase_precede(&hb);
        assert_eq!(hb.predecessor_count(), 0);
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let target = noop();
        let ht = TaskHandle::new(&target);
        let deps: Vec<_> = (0..4).map(|_| noop()).collect();
        let handles: Vec<_> = deps.iter().map(TaskHandle::new).collect();
        for handle in &handles {
            ht.depend(handle).unwrap();
        }
        assert_eq!(ht.predecessors(), handles);
    }

    #[test]
    fn handles_compare_by_referenced_node() {
        let a = noop();
        let ha = TaskHandle::new(&a);
        assert_eq!(ha, ha.clone());
        assert_ne!(ha, TaskHandle::new(&noop()));
        assert_eq!(TaskHandle::default(), TaskHandle::default());
    }
}
