//! Streaming access to a running batch.

use crate::outcomes::BatchSummary;
use crate::scheduler::BatchStats;
use crate::worker::Report;
use chrono::Utc;
use futures::{Stream, StreamExt};
use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use taskpool_core::{BatchId, Failure, Outcome, TaskId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn};

/// Outcomes of a running batch, in completion order.
///
/// Yields exactly one `(TaskId, Outcome)` per submitted task and then ends.
/// If the channel closes while some task never reported, each such task is
/// yielded as an engine fault.
///
/// Dropping the stream before it ends cancels the batch: tasks that have not
/// started are skipped, running ones finish.
pub struct OutcomeStream<O> {
    reports: mpsc::UnboundedReceiver<Report<O>>,
    unreported: BTreeSet<TaskId>,
    summary: BatchSummary,
    stats: Arc<BatchStats>,
    coordinator: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl<O> OutcomeStream<O> {
    pub(crate) fn new(
        summary: BatchSummary,
        ids: impl IntoIterator<Item = TaskId>,
        reports: mpsc::UnboundedReceiver<Report<O>>,
        stats: Arc<BatchStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reports,
            unreported: ids.into_iter().collect(),
            summary,
            stats,
            coordinator: None,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }

    pub(crate) fn attach(&mut self, coordinator: JoinHandle<()>) {
        self.coordinator = Some(coordinator);
    }

    /// Identifier of the batch.
    pub fn batch_id(&self) -> BatchId {
        self.summary.batch_id
    }

    /// Tasks whose outcome has not been yielded yet.
    pub fn remaining(&self) -> usize {
        self.unreported.len()
    }

    /// Counts of the outcomes yielded so far.
    pub fn summary(&self) -> BatchSummary {
        let mut summary = self.summary.clone();
        summary.peak_active = self.stats.peak_active();
        summary
    }

    /// Skip every task that has not started yet.
    ///
    /// Skipped tasks still produce a `Cancelled` outcome.
    pub fn cancel(&self) {
        debug!("Cancelling batch {}", self.summary.batch_id);
        self.cancel.cancel();
    }

    /// Wait for the batch to end and return its summary.
    ///
    /// Outcomes not yet consumed are awaited and discarded. Returns only after
    /// the coordinator and every execution unit have exited.
    pub async fn finish(mut self) -> BatchSummary {
        while self.next().await.is_some() {}

        if let Some(coordinator) = self.coordinator.take() {
            if let Err(err) = coordinator.await {
                error!("Coordinator of batch {} failed: {}", self.summary.batch_id, err);
            }
        }

        let mut summary = self.summary();
        summary.finished_at = Some(Utc::now());
        summary
    }

    fn record(&mut self, id: TaskId, outcome: Outcome<O>) -> (TaskId, Outcome<O>) {
        self.summary.tally(&outcome);
        (id, outcome)
    }
}

impl<O> Stream for OutcomeStream<O> {
    type Item = (TaskId, Outcome<O>);

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.reports.poll_recv(cx) {
                Poll::Ready(Some((id, outcome))) => {
                    if !this.unreported.remove(&id) {
                        warn!("Ignoring second outcome for task {} in batch {}", id, this.summary.batch_id);
                        continue;
                    }
                    return Poll::Ready(Some(this.record(id, outcome)));
                }
                Poll::Ready(None) => {
                    let Some(id) = this.unreported.pop_first() else {
                        return Poll::Ready(None);
                    };
                    warn!("Task {} in batch {} never reported an outcome", id, this.summary.batch_id);
                    let outcome = Outcome::Failure(Failure::engine_fault(
                        "worker exited without reporting an outcome",
                    ));
                    return Poll::Ready(Some(this.record(id, outcome)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.unreported.len(), Some(self.unreported.len()))
    }
}

impl<O> std::fmt::Debug for OutcomeStream<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeStream")
            .field("batch_id", &self.summary.batch_id)
            .field("remaining", &self.unreported.len())
            .field("active", &self.stats.active())
            .finish_non_exhaustive()
    }
}
