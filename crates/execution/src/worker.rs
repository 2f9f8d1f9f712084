//! Execution units - run tasks on blocking threads and report outcomes.

use crate::scheduler::BatchStats;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use taskpool_core::{Failure, Outcome, Task, TaskId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One outcome on its way to the stream.
pub(crate) type Report<O> = (TaskId, Outcome<O>);

/// Shared FIFO of tasks for the worker pool.
pub(crate) type TaskQueue<T> = Arc<Mutex<VecDeque<(TaskId, T)>>>;

/// What every execution unit of a batch needs.
///
/// Each unit owns a clone; the outcome channel closes once the coordinator
/// and every unit have dropped theirs.
pub(crate) struct UnitContext<O> {
    reports: mpsc::UnboundedSender<Report<O>>,
    stats: Arc<BatchStats>,
    cancel: CancellationToken,
}

impl<O> Clone for UnitContext<O> {
    fn clone(&self) -> Self {
        Self {
            reports: self.reports.clone(),
            stats: Arc::clone(&self.stats),
            cancel: self.cancel.clone(),
        }
    }
}

impl<O: Send + 'static> UnitContext<O> {
    pub(crate) fn new(
        reports: mpsc::UnboundedSender<Report<O>>,
        stats: Arc<BatchStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self { reports, stats, cancel }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run a task unless the batch is cancelled, then report its outcome.
    pub(crate) fn dispatch<T>(&self, id: TaskId, task: T)
    where
        T: Task<Output = O>,
    {
        let outcome = if self.cancel.is_cancelled() {
            debug!("Skipping task {}: batch cancelled", id);
            Outcome::Failure(Failure::cancelled())
        } else {
            run_task(id, task, &self.stats)
        };
        self.report(id, outcome);
    }

    /// Send an outcome to the stream.
    pub(crate) fn report(&self, id: TaskId, outcome: Outcome<O>) {
        if self.reports.send((id, outcome)).is_err() {
            debug!("Outcome for task {} dropped: stream closed", id);
        }
    }
}

/// Execute one task, turning a panic into an engine fault.
///
/// The task counts as active for exactly the duration of `execute`.
pub(crate) fn run_task<T: Task>(id: TaskId, task: T, stats: &Arc<BatchStats>) -> Outcome<T::Output> {
    debug!("Executing task {}", id);
    let result = {
        let _active = stats.enter();
        panic::catch_unwind(AssertUnwindSafe(|| task.execute()))
    };

    match result {
        Ok(result) => {
            let outcome = Outcome::from_result(result);
            debug!("Task {} finished: {}", id, if outcome.is_success() { "success" } else { "failure" });
            outcome
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            warn!("Task {} panicked: {}", id, message);
            Outcome::Failure(Failure::engine_fault(format!("task panicked: {message}")))
        }
    }
}

/// Body of one pool worker: pop and dispatch until the queue is empty.
///
/// The queue is filled before any worker starts, so an empty queue means the
/// batch is exhausted for every worker.
pub(crate) fn pool_worker<T: Task>(worker: usize, queue: &TaskQueue<T>, unit: &UnitContext<T::Output>) {
    let mut handled = 0usize;
    loop {
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let Some((id, task)) = next else {
            break;
        };
        unit.dispatch(id, task);
        handled += 1;
    }
    debug!("Worker {} exiting after {} tasks", worker, handled);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
