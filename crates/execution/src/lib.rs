//! Execution layer - bounded-concurrency batches, outcome streaming and
//! per-batch bookkeeping.

#![warn(missing_docs)]

pub mod error;
pub mod scheduler;
pub mod outcomes;
pub mod stream;
pub mod engine;
mod worker;

pub use error::{ExecutorError, Result};
pub use scheduler::{ConcurrencyLimit, DispatchStrategy};
pub use outcomes::{BatchOutcomes, BatchSummary};
pub use stream::OutcomeStream;
pub use engine::{Executor, ExecutorConfig};

pub use taskpool_core::{BatchId, Failure, FailureKind, FnTask, Outcome, Task, TaskId};
