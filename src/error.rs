//! Error types for request processing
//!
//! This module defines the error taxonomy used across the request lifecycle:
//! validation failures, execution failures, cooperative cancellation, and
//! browser pool failures. Admission rejection is deliberately *not* an error
//! (it is a value-level outcome of `try_acquire_slot`).

use std::sync::Arc;

/// Error raised while creating or using pooled browser resources.
///
/// Cloneable so a single creation failure can fan out identically to every
/// request queued on the same pool key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    /// Launching the browser process for a pool key failed
    #[error("failed to launch {key}: {message}")]
    Launch { key: String, message: String },

    /// Allocating the per-request session (context/page) failed
    #[error("failed to open session: {message}")]
    Session { message: String },

    /// The pool is shutting down and no longer hands out resources
    #[error("browser pool is closed")]
    PoolClosed,
}

/// Terminal error for a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// Bad input; never retried, surfaced as a client error
    #[error("validation failed: {0}")]
    Validation(String),

    /// Runtime failure while executing the request
    #[error("execution failed: {0}")]
    Execution(String),

    /// The request observed its cancellation flag
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A pause outlived the configured ceiling
    #[error("pause exceeded the configured limit")]
    PauseTimeout,

    /// Browser pool failure (launch or session allocation)
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl RequestError {
    /// True for cancellation-class errors (`Cancelled`, `PauseTimeout`).
    ///
    /// These resolve the request as `Cancelled` rather than `Failed`.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::PauseTimeout)
    }

    /// Shared handle for storing one error in several places (completion
    /// signal, snapshots) without cloning large messages repeatedly.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl From<anyhow::Error> for RequestError {
    fn from(err: anyhow::Error) -> Self {
        // Use {:#} to preserve full error chain with context
        Self::Execution(format!("{err:#}"))
    }
}

/// Convenience alias used throughout the engine.
pub type RequestResult<T> = Result<T, RequestError>;
