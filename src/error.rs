use thiserror::Error;

/// Failure surfaced by the graph and pool engines.
///
/// The error surface deliberately has exactly two kinds: arguments the engine
/// cannot accept, and operations the engine cannot honor in its current state
/// (including body failures aggregated by `wait`). Timed waits report their
/// outcome through [`crate::types::WaitStatus`] instead of an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TaskError {
    /// The caller handed the engine something it cannot accept: an empty
    /// handle, a self-edge, a handle into a foreign graph.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The engine cannot honor the operation in its current state, an edge
    /// would close a cycle, or worker bodies failed during execution.
    #[error("{0}")]
    Runtime(String),
}

impl TaskError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }
}
