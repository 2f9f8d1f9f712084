//! Outcome model - the exactly-one result recorded per task.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of running one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The task returned a value
    Success(T),
    /// The task did not produce a value
    Failure(Failure),
}

impl<T> Outcome<T> {
    /// Build an outcome from the task's own result.
    ///
    /// The full error chain is kept in the message.
    pub fn from_result(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(Failure::task(format!("{err:#}"))),
        }
    }

    /// Whether the task succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Whether the task failed, for any reason.
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Get the success value, if any.
    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    /// Get the failure, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

impl<T> From<anyhow::Result<T>> for Outcome<T> {
    fn from(result: anyhow::Result<T>) -> Self {
        Self::from_result(result)
    }
}

/// Why a task has no success value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable description
    pub message: String,
}

impl Failure {
    /// The task reported a failure of its own.
    pub fn task(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Task, message: message.into() }
    }

    /// The engine could not run the task to completion.
    pub fn engine_fault(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::EngineFault, message: message.into() }
    }

    /// The batch was cancelled before the task started.
    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "batch cancelled before the task started".to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Returned by the task's own logic
    Task,
    /// The task panicked or its worker exited without reporting
    EngineFault,
    /// Never started because the batch was cancelled
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Task => write!(f, "task failure"),
            FailureKind::EngineFault => write!(f, "engine fault"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_from_ok_result() {
        let outcome = Outcome::from_result(Ok::<_, anyhow::Error>(7));
        assert!(outcome.is_success());
        assert_eq!(outcome.success(), Some(&7));
        assert!(outcome.failure().is_none());
    }

    #[test]
    fn test_from_err_result_keeps_context_chain() {
        let result: anyhow::Result<u32> = Err(anyhow::anyhow!("disk full"))
            .context("writing report");
        let outcome = Outcome::from(result);

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Task);
        assert_eq!(failure.message, "writing report: disk full");
    }

    #[test]
    fn test_into_result() {
        let ok: Outcome<&str> = Outcome::Success("done");
        assert_eq!(ok.into_result(), Ok("done"));

        let failed: Outcome<&str> = Outcome::Failure(Failure::cancelled());
        assert_eq!(failed.into_result().unwrap_err().kind, FailureKind::Cancelled);
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::engine_fault("task panicked: boom");
        assert_eq!(failure.to_string(), "engine fault: task panicked: boom");
    }

    #[test]
    fn test_outcome_json_shape() {
        let ok: Outcome<String> = Outcome::Success("ok".to_string());
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"status": "success", "detail": "ok"})
        );

        let failed: Outcome<String> = Outcome::Failure(Failure::task("task failed"));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({
                "status": "failure",
                "detail": {"kind": "task", "message": "task failed"}
            })
        );
    }
}
