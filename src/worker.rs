//! Worker records shared by the graph and pool engines.
//!
//! A worker is one OS thread plus the book-keeping both engines need: a
//! unique id, an observable state, and a one-shot completion signal carrying
//! either unit success or the failure captured from the body.

use core::sync::atomic::{AtomicU8, Ordering};
use derive_more::Debug;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};
use tracing::debug;

/// Lifecycle of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    /// Awaiting the engine's start signal (pool workers only).
    Delay,
    /// Waiting for work.
    Ready,
    /// Running a unit.
    Busy,
    /// Exited cleanly; the thread is about to finish.
    Completed,
}

/// Atomic cell holding a [`WorkerState`].
#[derive(Debug)]
pub(crate) struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Delay as u8))
    }

    pub(crate) fn load(&self) -> WorkerState {
        match self.0.load(Ordering::Acquire) {
            0 => WorkerState::Delay,
            1 => WorkerState::Ready,
            2 => WorkerState::Busy,
            _ => WorkerState::Completed,
        }
    }

    pub(crate) fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Failure captured from a worker body, as a displayable message.
#[derive(Debug, Clone)]
pub(crate) struct WorkerFailure(pub(crate) String);

/// What a worker reports through its one-shot completion signal.
pub(crate) type WorkerOutcome = Result<(), WorkerFailure>;

/// Book-keeping for one spawned worker: identity, observable state, the
/// completion signal, and the OS thread.
#[derive(Debug)]
pub(crate) struct WorkerContext {
    pub(crate) id: u32,
    state: Arc<WorkerStateCell>,
    #[debug(skip)]
    signal: Receiver<WorkerOutcome>,
    outcome: Option<WorkerOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerContext {
    /// Spawn a named worker thread running `body`.
    ///
    /// `body` must fulfil the completion signal exactly once before
    /// returning.
    pub(crate) fn spawn(
        id: u32,
        name: String,
        body: impl FnOnce(Arc<WorkerStateCell>, Sender<WorkerOutcome>) + Send + 'static,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let state = Arc::new(WorkerStateCell::new());
        let thread_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || body(thread_state, sender))
            .expect("failed to spawn worker thread");
        debug!(worker = id, "spawned worker");
        Self {
            id,
            state,
            signal: receiver,
            outcome: None,
            handle: Some(handle),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.state.load()
    }

    /// Block until the worker's completion signal resolves and return it.
    pub(crate) fn harvest(&mut self) -> WorkerOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = self.signal.recv().unwrap_or_else(|_| {
            Err(WorkerFailure(
                "worker exited without reporting an outcome".into(),
            ))
        });
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Wait for the completion signal until `deadline`.
    ///
    /// Returns false on timeout. A signal that resolves here is remembered,
    /// so a later [`harvest`](Self::harvest) never loses it.
    pub(crate) fn await_signal_until(&mut self, deadline: Instant) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        match self.signal.recv_timeout(deadline - now) {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.outcome = Some(Err(WorkerFailure(
                    "worker exited without reporting an outcome".into(),
                )));
                true
            }
        }
    }

    /// Join the OS thread if it has not been joined yet.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Run a unit body, converting an error return or a panic into a stored
/// worker failure.
pub(crate) fn run_body_guarded(
    body: impl FnOnce() -> anyhow::Result<()>,
) -> Result<(), WorkerFailure> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(WorkerFailure(format!("{error:#}"))),
        Err(payload) => Err(WorkerFailure(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker body panicked".to_owned()
    }
}
