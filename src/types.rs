use core::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a unit of work.
///
/// Transitions are driven exclusively by the engines, never by the body, and
/// are monotonic within one execution cycle:
/// `Ready` → `Executing` → `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// The unit may be claimed by a worker once its predecessors complete.
    Ready,
    /// A worker is currently running the unit's body.
    Executing,
    /// The body has returned.
    Completed,
}

/// Outcome of a timed wait on an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum WaitStatus {
    /// Every worker finished within the budget.
    Ready,
    /// At least one worker had not finished when the budget ran out.
    Timeout,
}

/// Atomic cell holding a [`RunState`].
///
/// Stores publish with `Release` and loads observe with `Acquire`, so a
/// thread that sees `Completed` also sees the body's side effects.
#[derive(Debug)]
pub(crate) struct RunStateCell(AtomicU8);

impl RunStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(RunState::Ready as u8))
    }

    pub(crate) fn load(&self) -> RunState {
        match self.0.load(Ordering::Acquire) {
            0 => RunState::Ready,
            1 => RunState::Executing,
            _ => RunState::Completed,
        }
    }

    pub(crate) fn store(&self, state: RunState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
