//! Request lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a request.
///
/// `Completed`, `Failed`, `Cancelled` and `Rejected` are terminal: once a
/// request reaches any of them no further transition is permitted and its
/// completion signal is already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// Accepted by the engine, not yet validated
    Received,
    /// Input validation in progress
    Validating,
    /// Waiting for a pooled resource
    Queued,
    /// Executing
    Processing,
    /// Finished successfully
    Completed,
    /// Validation or execution failed
    Failed,
    /// Cancellation was observed
    Cancelled,
    /// Turned away by admission control; never executed
    Rejected,
}

impl RequestState {
    /// True for states that end the request lifecycle.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Rejected
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}
