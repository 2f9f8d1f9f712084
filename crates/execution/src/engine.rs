//! The executor - runs a batch of tasks under a concurrency limit.

use crate::error::{ExecutorError, Result};
use crate::outcomes::{BatchOutcomes, BatchSummary};
use crate::scheduler::{BatchStats, ConcurrencyLimit, DispatchStrategy};
use crate::stream::OutcomeStream;
use crate::worker::{pool_worker, TaskQueue, UnitContext};
use futures::StreamExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use taskpool_core::{BatchId, Failure, Outcome, Task, TaskId};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// How tasks reach execution units
    pub strategy: DispatchStrategy,
}

impl ExecutorConfig {
    /// Set the dispatch strategy.
    pub fn with_strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Runs batches of independent tasks with bounded concurrency.
///
/// Every batch gets its own admission slots and counters, so several batches
/// (and several executors) can run side by side. Tasks run on Tokio's
/// blocking thread pool, so the calls below must be made from inside a Tokio
/// runtime.
///
/// ```text
/// submit → admit (≤ limit active) → execute → report → all reported → return
/// ```
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
    shutdown: CancellationToken,
}

impl Executor {
    /// Create an executor with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a batch and wait for every outcome.
    ///
    /// Returns one outcome per task, keyed by task id. Task failures, panics
    /// and cancellations are outcomes; only invalid arguments are errors, and
    /// those are reported before anything runs.
    pub async fn submit_and_wait<T: Task>(
        &self,
        tasks: Vec<T>,
        concurrency_limit: usize,
    ) -> Result<BatchOutcomes<T::Output>> {
        let mut stream = self.submit(tasks, concurrency_limit)?;

        let mut outcomes = BTreeMap::new();
        while let Some((id, outcome)) = stream.next().await {
            outcomes.insert(id, outcome);
        }

        let summary = stream.finish().await;
        info!(
            "Batch {} finished: {} succeeded, {} failed, {} faulted, {} cancelled (peak {} active)",
            summary.batch_id,
            summary.succeeded,
            summary.failed,
            summary.faulted,
            summary.cancelled,
            summary.peak_active,
        );

        Ok(BatchOutcomes::new(outcomes, summary))
    }

    /// Start a batch and stream its outcomes as they complete.
    ///
    /// An empty batch yields an empty stream and spawns nothing.
    pub fn submit<T: Task>(
        &self,
        tasks: Vec<T>,
        concurrency_limit: usize,
    ) -> Result<OutcomeStream<T::Output>> {
        let limit = ConcurrencyLimit::new(concurrency_limit)?;
        let batch = index_batch(tasks)?;
        let runtime = if batch.is_empty() {
            None
        } else {
            Some(Handle::try_current().map_err(|_| ExecutorError::NoRuntime)?)
        };

        let strategy = self.config.strategy;
        let batch_id = BatchId::new();
        let stats = Arc::new(BatchStats::new(limit));
        let cancel = self.shutdown.child_token();
        let (reports, receiver) = mpsc::unbounded_channel();

        let mut stream = OutcomeStream::new(
            BatchSummary::new(batch_id, strategy, limit, batch.len()),
            batch.iter().map(|(id, _)| *id),
            receiver,
            Arc::clone(&stats),
            cancel.clone(),
        );

        let Some(runtime) = runtime else {
            debug!("Batch {} is empty, nothing to run", batch_id);
            return Ok(stream);
        };

        info!(
            "Starting batch {}: {} tasks, limit {}, strategy {}",
            batch_id,
            batch.len(),
            limit,
            strategy
        );

        let unit = UnitContext::new(reports, stats, cancel);
        let coordinator = match strategy {
            DispatchStrategy::Gated => runtime.spawn(run_gated(batch_id, batch, limit, unit)),
            DispatchStrategy::WorkerPool => runtime.spawn(run_pool(batch_id, batch, limit, unit)),
        };
        stream.attach(coordinator);

        Ok(stream)
    }

    /// Cancel every batch of this executor, running or future.
    ///
    /// Tasks already executing finish; the rest report `Cancelled`.
    pub fn cancel(&self) {
        info!("Executor cancelled");
        self.shutdown.cancel();
    }

    /// Whether [`Executor::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Pair each task with its id, rejecting duplicates.
fn index_batch<T: Task>(tasks: Vec<T>) -> Result<Vec<(TaskId, T)>> {
    let mut seen = HashSet::with_capacity(tasks.len());
    tasks
        .into_iter()
        .map(|task| {
            let id = task.id();
            if seen.insert(id) {
                Ok((id, task))
            } else {
                Err(ExecutorError::DuplicateTaskId(id))
            }
        })
        .collect()
}

/// Admit tasks in submission order, one semaphore permit each.
///
/// The permit moves into the unit that runs the task and is released when
/// that unit ends, whichever way it ends.
async fn run_gated<T: Task>(
    batch_id: BatchId,
    batch: Vec<(TaskId, T)>,
    limit: ConcurrencyLimit,
    unit: UnitContext<T::Output>,
) {
    // Never more slots than tasks; also keeps huge limits under the
    // semaphore's permit ceiling.
    let slots = Arc::new(Semaphore::new(limit.effective(batch.len())));
    let mut units = JoinSet::new();
    let mut pending = batch.into_iter();

    while let Some((id, task)) = pending.next() {
        let admitted = tokio::select! {
            biased;
            _ = unit.cancel_token().cancelled() => Err(Failure::cancelled()),
            permit = Arc::clone(&slots).acquire_owned() => {
                permit.map_err(|_| Failure::engine_fault("admission slots closed"))
            }
        };

        let permit = match admitted {
            Ok(permit) => permit,
            Err(failure) => {
                debug!("Batch {} stopped admitting at task {}: {}", batch_id, id, failure);
                unit.report(id, Outcome::Failure(failure.clone()));
                for (id, _) in pending.by_ref() {
                    unit.report(id, Outcome::Failure(failure.clone()));
                }
                break;
            }
        };

        debug!("Admitted task {} ({} slots left)", id, slots.available_permits());
        let worker = unit.clone();
        units.spawn_blocking(move || {
            let _slot = permit;
            worker.dispatch(id, task);
        });
    }

    drop(unit);
    drain(batch_id, units).await;
}

/// Queue the whole batch, then start `min(limit, batch)` workers on it.
async fn run_pool<T: Task>(
    batch_id: BatchId,
    batch: Vec<(TaskId, T)>,
    limit: ConcurrencyLimit,
    unit: UnitContext<T::Output>,
) {
    let workers = limit.effective(batch.len());
    let queue: TaskQueue<T> = Arc::new(Mutex::new(batch.into()));
    let mut units = JoinSet::new();

    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let unit = unit.clone();
        units.spawn_blocking(move || pool_worker(worker, &queue, &unit));
    }
    debug!("Batch {} started {} workers", batch_id, workers);

    drop(unit);
    drain(batch_id, units).await;
}

/// Wait until every execution unit of a batch has exited.
async fn drain(batch_id: BatchId, mut units: JoinSet<()>) {
    while let Some(joined) = units.join_next().await {
        if let Err(err) = joined {
            warn!("Execution unit of batch {} exited abnormally: {}", batch_id, err);
        }
    }
    debug!("All execution units of batch {} exited", batch_id);
}
