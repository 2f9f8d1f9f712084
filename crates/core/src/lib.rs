//! taskpool core data models.
//!
//! This crate defines the unit of work handed to the executor and the
//! outcome recorded for it. It has no runtime dependencies.

#![warn(missing_docs)]

// Identities
mod id;

// Work and results
mod task;
mod outcome;

// Re-exports
pub use id::*;
pub use task::{Task, FnTask};
pub use outcome::{Outcome, Failure, FailureKind};
