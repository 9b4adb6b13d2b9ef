use crate::types::{RunState, RunStateCell};
use derive_more::Debug;

/// A deferred unit of work.
///
/// Both engines accept anything implementing this trait. The body is invoked
/// exactly once per execution cycle and reports failure by returning an
/// error; a panicking body is also caught by the worker that ran it and
/// promoted to the engine's failure channel.
///
/// Fallible closures implement the trait directly, so
/// `pool.push(|| -> anyhow::Result<()> { Ok(()) })` works without a wrapper
/// type. For infallible closures both engines offer a `push_fn` convenience.
pub trait Runnable: Send {
    /// Run the body.
    fn run(&mut self) -> anyhow::Result<()>;
}

impl<F> Runnable for F
where
    F: FnMut() -> anyhow::Result<()> + Send,
{
    fn run(&mut self) -> anyhow::Result<()> {
        self()
    }
}

/// A queued work unit: the user body plus its lifecycle state.
///
/// Owned by the pool queue while resident; ownership transfers to the worker
/// that pops it, and the worker drops it after running.
#[derive(Debug)]
pub(crate) struct WorkUnit {
    state: RunStateCell,
    #[debug(skip)]
    body: Box<dyn Runnable>,
}

impl WorkUnit {
    pub(crate) fn new(body: Box<dyn Runnable>) -> Self {
        Self {
            state: RunStateCell::new(),
            body,
        }
    }

    pub(crate) fn set_state(&self, state: RunState) {
        self.state.store(state);
    }

    pub(crate) fn run(&mut self) -> anyhow::Result<()> {
        self.body.run()
    }
}
