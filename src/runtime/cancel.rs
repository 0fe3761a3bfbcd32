//! Cooperative cancellation token
//!
//! Cancellation in the engine is advisory: a flag that long-running work
//! polls at state transitions and that every suspension point selects
//! against. [`CancelToken::checked`] is the single cancellation-aware wait
//! primitive - semaphore acquisitions, queue waits, and completion awaits
//! all go through it, so new suspension points inherit correct behavior
//! for free.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use crate::error::{RequestError, RequestResult};

/// One-way settable cancellation flag plus a way to wait on it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Idempotent; wakes every waiter.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// True once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Suspend until the token is cancelled. Returns immediately if it
    /// already is.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` to completion unless the token fires first.
    ///
    /// This is the suspension-point primitive: a queued or blocked request
    /// unblocks the moment it is cancelled, without first being scheduled
    /// to run its body.
    pub async fn checked<F, T>(&self, fut: F) -> RequestResult<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            () = self.wait() => Err(RequestError::Cancelled("cancelled while waiting".into())),
            value = fut => Ok(value),
        }
    }
}

/// Cancellation-aware wait for callers that may not have a token.
///
/// `NonCancellable` request kinds pass `None` and simply await the future.
pub async fn checked_wait<F, T>(token: Option<&CancelToken>, fut: F) -> RequestResult<T>
where
    F: Future<Output = T>,
{
    match token {
        Some(token) => token.checked(fut).await,
        None => Ok(fut.await),
    }
}
