use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure while loading or invoking a submission, as opposed to a grading mismatch
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExecutionFault {
    /// Request refused before any code was loaded
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Unit failed to compile into a callable
    #[error("Load error: {0}")]
    Load(String),

    /// Call failed: unresolvable function, bad arguments, or an error raised by the body
    #[error("Invocation error: {0}")]
    Invocation(String),

    /// Call overran its per-case deadline
    #[error("Invocation timed out after {0}ms")]
    Timeout(u64),

    /// Output could not be compared against the expected value
    #[error("Comparison error: {0}")]
    Comparison(String),
}

impl ExecutionFault {
    pub fn is_load(&self) -> bool {
        matches!(self, ExecutionFault::Load(_))
    }

    /// Timeouts count as invocation failures
    pub fn is_invocation(&self) -> bool {
        matches!(self, ExecutionFault::Invocation(_) | ExecutionFault::Timeout(_))
    }
}
