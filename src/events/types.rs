//! Event type definitions for the request event system
//!
//! Lifecycle and log events addressed by request id. The engine emits,
//! the transport layer fans out to connected clients; the engine has no
//! knowledge of who is listening.

use serde::{Deserialize, Serialize};

use crate::request::state::RequestState;
use crate::request::types::RequestId;

/// Severity of a request log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Event types emitted during request processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A client attached to the request's live status group
    ClientAdded { client: String },
    /// A client detached from the request's live status group
    ClientRemoved { client: String },
    /// The request transitioned to a new state
    StateChanged {
        state: RequestState,
        message: String,
    },
    /// The request reached a terminal state
    RunFinished { state: RequestState },
    /// A log line was recorded for the request
    Log { level: LogLevel, line: String },
}

/// A single event addressed to one request's status group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    pub request_id: RequestId,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub payload: EventPayload,
}

impl RequestEvent {
    #[must_use]
    pub fn new(request_id: RequestId, payload: EventPayload) -> Self {
        Self {
            request_id,
            timestamp: chrono::Utc::now(),
            payload,
        }
    }

    /// Create a `StateChanged` event
    #[must_use]
    pub fn state_changed(request_id: RequestId, state: RequestState, message: String) -> Self {
        Self::new(request_id, EventPayload::StateChanged { state, message })
    }

    /// Create a `RunFinished` event
    #[must_use]
    pub fn run_finished(request_id: RequestId, state: RequestState) -> Self {
        Self::new(request_id, EventPayload::RunFinished { state })
    }

    /// Create a `Log` event
    #[must_use]
    pub fn log(request_id: RequestId, level: LogLevel, line: String) -> Self {
        Self::new(request_id, EventPayload::Log { level, line })
    }
}
