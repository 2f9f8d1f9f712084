//! Task abstraction - the unit of work handed to the executor.

use crate::id::TaskId;

/// A unit of work with an identity and an execution procedure.
///
/// The executor takes ownership of each task, calls [`Task::execute`] exactly
/// once from a worker thread, and drops the task afterwards. Execution is
/// synchronous and may block; it must terminate.
///
/// Returning `Err` records a task failure for this id. It never affects other
/// tasks in the batch.
pub trait Task: Send + 'static {
    /// Value produced on success.
    type Output: Send + 'static;

    /// Identity used to correlate the outcome.
    fn id(&self) -> TaskId;

    /// Run the task.
    fn execute(&self) -> anyhow::Result<Self::Output>;
}

impl<T: Task + ?Sized> Task for Box<T> {
    type Output = T::Output;

    fn id(&self) -> TaskId {
        (**self).id()
    }

    fn execute(&self) -> anyhow::Result<Self::Output> {
        (**self).execute()
    }
}

/// A task built from a payload and a function over it.
///
/// The function decides success or failure, so the failure condition is
/// whatever the caller plugs in.
///
/// ```
/// use taskpool_core::{FnTask, Task, TaskId};
///
/// let task = FnTask::new(TaskId::new(3), "three".to_string(), |payload: &String| {
///     Ok(payload.len())
/// });
/// assert_eq!(task.execute().unwrap(), 5);
/// ```
pub struct FnTask<P, F> {
    id: TaskId,
    payload: P,
    run: F,
}

impl<P, F> FnTask<P, F> {
    /// Create a task with the given id, payload and execution function.
    pub fn new<O>(id: TaskId, payload: P, run: F) -> Self
    where
        F: Fn(&P) -> anyhow::Result<O>,
    {
        Self { id, payload, run }
    }

    /// Get the payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P, F, O> Task for FnTask<P, F>
where
    P: Send + 'static,
    F: Fn(&P) -> anyhow::Result<O> + Send + 'static,
    O: Send + 'static,
{
    type Output = O;

    fn id(&self) -> TaskId {
        self.id
    }

    fn execute(&self) -> anyhow::Result<O> {
        (self.run)(&self.payload)
    }
}

impl<P: std::fmt::Debug, F> std::fmt::Debug for FnTask<P, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}
