//! Aggregated results of a batch.

use crate::scheduler::{ConcurrencyLimit, DispatchStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use taskpool_core::{BatchId, Failure, FailureKind, Outcome, TaskId};

/// Counts and timing for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Batch identifier
    pub batch_id: BatchId,
    /// Strategy used to dispatch the batch
    pub strategy: DispatchStrategy,
    /// Concurrency limit of the batch
    pub concurrency_limit: ConcurrencyLimit,
    /// Number of submitted tasks
    pub total: usize,
    /// Tasks that returned a value
    pub succeeded: usize,
    /// Tasks that reported their own failure
    pub failed: usize,
    /// Tasks that panicked or lost their worker
    pub faulted: usize,
    /// Tasks skipped by cancellation
    pub cancelled: usize,
    /// Highest number of tasks executing at once
    pub peak_active: usize,
    /// Submission timestamp
    pub started_at: DateTime<Utc>,
    /// Set once every outcome is in and every unit has exited
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchSummary {
    pub(crate) fn new(
        batch_id: BatchId,
        strategy: DispatchStrategy,
        concurrency_limit: ConcurrencyLimit,
        total: usize,
    ) -> Self {
        Self {
            batch_id,
            strategy,
            concurrency_limit,
            total,
            succeeded: 0,
            failed: 0,
            faulted: 0,
            cancelled: 0,
            peak_active: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn tally<T>(&mut self, outcome: &Outcome<T>) {
        match outcome {
            Outcome::Success(_) => self.succeeded += 1,
            Outcome::Failure(failure) => match failure.kind {
                FailureKind::Task => self.failed += 1,
                FailureKind::EngineFault => self.faulted += 1,
                FailureKind::Cancelled => self.cancelled += 1,
            },
        }
    }

    /// Outcomes recorded so far.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed + self.faulted + self.cancelled
    }

    /// Whether every task in the batch succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }

    /// Wall-clock duration, once finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }
}

/// Every outcome of a finished batch, keyed by task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcomes<T> {
    outcomes: BTreeMap<TaskId, Outcome<T>>,
    summary: BatchSummary,
}

impl<T> BatchOutcomes<T> {
    pub(crate) fn new(outcomes: BTreeMap<TaskId, Outcome<T>>, summary: BatchSummary) -> Self {
        Self { outcomes, summary }
    }

    /// Number of outcomes (equals the batch size).
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the batch was empty.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcome of one task.
    pub fn get(&self, id: TaskId) -> Option<&Outcome<T>> {
        self.outcomes.get(&id)
    }

    /// All outcomes in task id order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &Outcome<T>)> {
        self.outcomes.iter().map(|(id, outcome)| (*id, outcome))
    }

    /// Successful tasks and their values.
    pub fn successes(&self) -> impl Iterator<Item = (TaskId, &T)> {
        self.iter()
            .filter_map(|(id, outcome)| outcome.success().map(|value| (id, value)))
    }

    /// Failed tasks and why.
    pub fn failures(&self) -> impl Iterator<Item = (TaskId, &Failure)> {
        self.iter()
            .filter_map(|(id, outcome)| outcome.failure().map(|failure| (id, failure)))
    }

    /// Batch counts and timing.
    pub fn summary(&self) -> &BatchSummary {
        &self.summary
    }

    /// Take the outcome map.
    pub fn into_map(self) -> BTreeMap<TaskId, Outcome<T>> {
        self.outcomes
    }
}

impl<T> IntoIterator for BatchOutcomes<T> {
    type Item = (TaskId, Outcome<T>);
    type IntoIter = std::collections::btree_map::IntoIter<TaskId, Outcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BatchOutcomes<String> {
        let mut summary = BatchSummary::new(
            BatchId::new(),
            DispatchStrategy::Gated,
            ConcurrencyLimit::new(2).unwrap(),
            4,
        );
        let outcomes: BTreeMap<_, _> = [
            (TaskId::new(3), Outcome::Success("three".to_string())),
            (TaskId::new(1), Outcome::Success("one".to_string())),
            (TaskId::new(2), Outcome::Failure(Failure::task("task failed"))),
            (TaskId::new(4), Outcome::Failure(Failure::cancelled())),
        ]
        .into_iter()
        .collect();
        for outcome in outcomes.values() {
            summary.tally(outcome);
        }
        BatchOutcomes::new(outcomes, summary)
    }

    #[test]
    fn test_tally_counts_each_kind() {
        let batch = sample();
        let summary = batch.summary();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.faulted, 0);
        assert_eq!(summary.completed(), 4);
        assert!(!summary.all_succeeded());
        assert!(summary.elapsed().is_none());
    }

    #[test]
    fn test_iteration_is_in_id_order() {
        let batch = sample();
        let ids: Vec<u64> = batch.iter().map(|(id, _)| id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let successes: Vec<_> = batch.successes().map(|(id, v)| (id.get(), v.as_str())).collect();
        assert_eq!(successes, vec![(1, "one"), (3, "three")]);

        let failures: Vec<_> = batch.failures().map(|(id, f)| (id.get(), f.kind)).collect();
        assert_eq!(failures, vec![(2, FailureKind::Task), (4, FailureKind::Cancelled)]);
    }

    #[test]
    fn test_lookup_and_into_map() {
        let batch = sample();
        assert_eq!(batch.len(), 4);
        assert!(batch.get(TaskId::new(5)).is_none());
        assert!(batch.get(TaskId::new(1)).unwrap().is_success());

        let map = batch.into_map();
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_serializes_with_task_id_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["outcomes"]["1"]["status"], "success");
        assert_eq!(json["outcomes"]["2"]["detail"]["kind"], "task");
        assert_eq!(json["summary"]["strategy"], "gated");
        assert_eq!(json["summary"]["concurrency_limit"], 2);
    }
}
