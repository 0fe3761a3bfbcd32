//! Process-wide I/O throttle
//!
//! Bounds concurrent file and credential-store I/O across every request
//! type with a single counting semaphore. Acquisition is cancellation-aware
//! so a cancelled request parked on the throttle unblocks immediately.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::RequestResult;
use crate::runtime::cancel::{CancelToken, checked_wait};

#[derive(Debug, Clone)]
pub struct IoThrottle {
    semaphore: Arc<Semaphore>,
}

impl IoThrottle {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Acquire one I/O permit; released on drop.
    ///
    /// # Panics
    /// Panics if the semaphore is closed, which never happens in normal
    /// operation (the throttle is never closed).
    pub async fn acquire(&self, cancel: Option<&CancelToken>) -> RequestResult<OwnedSemaphorePermit> {
        let permit = checked_wait(cancel, self.semaphore.clone().acquire_owned()).await?;
        Ok(permit.expect("io throttle semaphore closed"))
    }

    /// Permits currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
