//! Concurrency limits, dispatch strategies and per-batch bookkeeping.

use crate::error::{ExecutorError, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Maximum number of tasks executing at once within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyLimit(NonZeroUsize);

impl ConcurrencyLimit {
    /// Validate a raw limit.
    pub fn new(limit: usize) -> Result<Self> {
        NonZeroUsize::new(limit)
            .map(Self)
            .ok_or(ExecutorError::InvalidConcurrencyLimit(limit))
    }

    /// Get the limit.
    pub fn get(self) -> usize {
        self.0.get()
    }

    /// Parallelism actually reachable for a batch of `batch_len` tasks.
    pub fn effective(self, batch_len: usize) -> usize {
        self.get().min(batch_len)
    }
}

impl Default for ConcurrencyLimit {
    /// One slot per available CPU.
    fn default() -> Self {
        Self(std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN))
    }
}

impl From<NonZeroUsize> for ConcurrencyLimit {
    fn from(limit: NonZeroUsize) -> Self {
        Self(limit)
    }
}

impl std::fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// How tasks are handed to execution units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// One short-lived unit per task, admitted through a counting semaphore
    /// in submission order.
    #[default]
    Gated,
    /// `min(limit, batch)` long-lived workers draining a shared FIFO queue.
    WorkerPool,
}

impl std::fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStrategy::Gated => write!(f, "gated"),
            DispatchStrategy::WorkerPool => write!(f, "pool"),
        }
    }
}

impl std::str::FromStr for DispatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gated" | "semaphore" => Ok(DispatchStrategy::Gated),
            "pool" | "worker-pool" | "worker_pool" => Ok(DispatchStrategy::WorkerPool),
            other => Err(format!("unknown dispatch strategy: {other}")),
        }
    }
}

/// Live counters for one batch.
///
/// Shared between the coordinator and every execution unit of the batch;
/// each batch gets a fresh instance.
#[derive(Debug)]
pub(crate) struct BatchStats {
    limit: ConcurrencyLimit,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    executed: AtomicUsize,
}

impl BatchStats {
    /// Create counters for a batch with the given limit.
    pub(crate) fn new(limit: ConcurrencyLimit) -> Self {
        Self {
            limit,
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            executed: AtomicUsize::new(0),
        }
    }

    /// Register a task start. The returned guard registers its completion
    /// when dropped, including during a panic unwind.
    pub(crate) fn enter(self: &Arc<Self>) -> ActiveGuard {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(
            active <= self.limit.get(),
            "{active} tasks active with limit {}",
            self.limit
        );
        self.peak_active.fetch_max(active, Ordering::SeqCst);
        ActiveGuard { stats: Arc::clone(self) }
    }

    /// Tasks executing right now.
    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of tasks seen executing at once.
    pub(crate) fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Tasks whose execution has ended, however it ended.
    pub(crate) fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

/// Marks one task as executing for as long as it lives.
#[derive(Debug)]
#[must_use = "the task counts as active only while the guard is held"]
pub(crate) struct ActiveGuard {
    stats: Arc<BatchStats>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.stats.executed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_rejects_zero() {
        assert_eq!(
            ConcurrencyLimit::new(0),
            Err(ExecutorError::InvalidConcurrencyLimit(0))
        );
        assert_eq!(ConcurrencyLimit::new(3).unwrap().get(), 3);
    }

    #[test]
    fn test_effective_limit() {
        let limit = ConcurrencyLimit::new(4).unwrap();
        assert_eq!(limit.effective(10), 4);
        assert_eq!(limit.effective(2), 2);
        assert_eq!(limit.effective(0), 0);

        let unbounded = ConcurrencyLimit::new(usize::MAX).unwrap();
        assert_eq!(unbounded.effective(3), 3);
    }

    #[test]
    fn test_default_limit_is_positive() {
        assert!(ConcurrencyLimit::default().get() >= 1);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("gated".parse(), Ok(DispatchStrategy::Gated));
        assert_eq!("Pool".parse(), Ok(DispatchStrategy::WorkerPool));
        assert_eq!("worker-pool".parse(), Ok(DispatchStrategy::WorkerPool));
        assert!("fifo".parse::<DispatchStrategy>().is_err());
        assert_eq!(DispatchStrategy::default(), DispatchStrategy::Gated);
    }

    #[test]
    fn test_strategy_display_round_trips() {
        for strategy in [DispatchStrategy::Gated, DispatchStrategy::WorkerPool] {
            assert_eq!(strategy.to_string().parse(), Ok(strategy));
        }
    }

    #[test]
    fn test_guard_tracks_active_and_peak() {
        let stats = Arc::new(BatchStats::new(ConcurrencyLimit::new(2).unwrap()));

        let first = stats.enter();
        let second = stats.enter();
        assert_eq!(stats.active(), 2);
        assert_eq!(stats.peak_active(), 2);

        drop(first);
        assert_eq!(stats.active(), 1);
        assert_eq!(stats.executed(), 1);

        drop(second);
        let third = stats.enter();
        drop(third);
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.peak_active(), 2);
        assert_eq!(stats.executed(), 3);
    }

    #[test]
    fn test_guard_released_on_panic() {
        let stats = Arc::new(BatchStats::new(ConcurrencyLimit::new(1).unwrap()));
        let inner = Arc::clone(&stats);

        let result = std::panic::catch_unwind(move || {
            let _guard = inner.enter();
            panic!("boom");
        });

        assert!(result.is_err());
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.executed(), 1);
    }
}
