//! Errors reported before a batch is dispatched.

use taskpool_core::TaskId;

/// Result type for executor calls.
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Invalid arguments to a submit call.
///
/// Returned synchronously; nothing has been spawned when one of these is seen.
/// Failures of individual tasks are never reported here, they are outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// Concurrency limit below one
    #[error("Concurrency limit must be at least 1, got {0}")]
    InvalidConcurrencyLimit(usize),

    /// Two tasks in one batch share an id
    #[error("Duplicate task id in batch: {0}")]
    DuplicateTaskId(TaskId),

    /// Called outside a Tokio runtime
    #[error("Executor must be used from within a Tokio runtime")]
    NoRuntime,
}
