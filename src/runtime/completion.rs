//! Single-assignment completion signal
//!
//! A request's eventual outcome is published exactly once through a
//! [`Completion`]. Assignment is idempotent by construction: the first
//! `set_*` wins and every later attempt is a no-op, so concurrent
//! finalization paths (normal completion racing a cancel, shutdown racing
//! both) are safe without caller-side coordination.

use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::error::RequestError;

/// Resolved value of a [`Completion`].
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The work finished and produced a value
    Value(T),
    /// The work was cancelled or rejected before producing a value
    Cancelled(String),
    /// The work failed
    Error(Arc<RequestError>),
}

impl<T> Outcome<T> {
    /// True if this outcome is the cancelled variant.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Single-assignment future: exactly one of {value, cancelled, error} is set
/// once; awaiting it before assignment suspends the caller.
#[derive(Debug)]
pub struct Completion<T> {
    slot: Mutex<Option<Outcome<T>>>,
    resolved: Notify,
}

impl<T: Clone> Completion<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            resolved: Notify::new(),
        }
    }

    /// Resolve with a value. No-op if already resolved.
    pub async fn set_value(&self, value: T) {
        self.assign(Outcome::Value(value)).await;
    }

    /// Resolve as cancelled. No-op if already resolved.
    pub async fn set_cancelled(&self, reason: impl Into<String>) {
        self.assign(Outcome::Cancelled(reason.into())).await;
    }

    /// Resolve with an error. No-op if already resolved.
    pub async fn set_error(&self, error: Arc<RequestError>) {
        self.assign(Outcome::Error(error)).await;
    }

    async fn assign(&self, outcome: Outcome<T>) {
        let mut slot = self.slot.lock().await;
        if slot.is_none() {
            *slot = Some(outcome);
            // Wake everyone parked in wait(); later waiters observe the slot
            // directly and never park.
            self.resolved.notify_waiters();
        }
    }

    /// True once any outcome has been assigned.
    pub async fn is_resolved(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Outcome if already assigned, without suspending.
    pub async fn peek(&self) -> Option<Outcome<T>> {
        self.slot.lock().await.clone()
    }

    /// Suspend until the completion is resolved, then return the outcome.
    pub async fn wait(&self) -> Outcome<T> {
        loop {
            // Register interest before checking the slot so an assignment
            // between the check and the await cannot be missed.
            let notified = self.resolved.notified();
            if let Some(outcome) = self.slot.lock().await.clone() {
                return outcome;
            }
            notified.await;
        }
    }
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}
