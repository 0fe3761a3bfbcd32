//! Request registry: admission control, lookup, graceful shutdown
//!
//! Tracks every in-flight request in a concurrent id map and gates the
//! heavyweight entry points behind a global counting semaphore. Admission
//! denial is a controlled outcome (the caller maps it to "server busy"),
//! never an error.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::request::{Request, RequestId};

/// How long shutdown waits on each tracked request before giving up on it.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// RAII admission slot.
///
/// Holding one counts against the configured maximum of concurrently
/// admitted requests; dropping it releases the slot exactly once.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct RequestRegistry {
    requests: DashMap<RequestId, Arc<Request>>,
    admission: Arc<Semaphore>,
    shutdown_grace: Duration,
}

impl RequestRegistry {
    #[must_use]
    pub fn new(max_concurrent_requests: usize) -> Self {
        Self::with_shutdown_grace(max_concurrent_requests, DEFAULT_SHUTDOWN_GRACE)
    }

    #[must_use]
    pub fn with_shutdown_grace(max_concurrent_requests: usize, shutdown_grace: Duration) -> Self {
        Self {
            requests: DashMap::new(),
            admission: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            shutdown_grace,
        }
    }

    /// Try to take one admission slot.
    ///
    /// A zero timeout means fail fast: either a slot is free right now or
    /// the caller gets `None` immediately (the edge maps that to a busy
    /// signal). A non-zero timeout waits up to that long.
    pub async fn try_acquire_slot(&self, timeout: Duration) -> Option<AdmissionPermit> {
        let permit = if timeout.is_zero() {
            self.admission.clone().try_acquire_owned().ok()
        } else {
            match tokio::time::timeout(timeout, self.admission.clone().acquire_owned()).await {
                Ok(Ok(permit)) => Some(permit),
                Ok(Err(_)) | Err(_) => None,
            }
        };
        permit.map(|p| AdmissionPermit { _permit: p })
    }

    /// Admission slots currently free.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.admission.available_permits()
    }

    pub fn register(&self, request: Arc<Request>) {
        debug!(request_id = %request.id(), kind = request.kind().name(), "registering request");
        self.requests.insert(request.id(), request);
    }

    /// Remove a request from tracking.
    ///
    /// A missing id is a tolerated no-op: shutdown may already have walked
    /// the map, or a concurrent path removed it first.
    pub fn deregister(&self, id: RequestId) -> Option<Arc<Request>> {
        self.requests.remove(&id).map(|(_, request)| request)
    }

    #[must_use]
    pub fn get(&self, id: RequestId) -> Option<Arc<Request>> {
        self.requests.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// All tracked requests matching `predicate`.
    pub fn find<F>(&self, predicate: F) -> Vec<Arc<Request>>
    where
        F: Fn(&Arc<Request>) -> bool,
    {
        self.requests
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Graceful shutdown: cancel every cancellable request, then await each
    /// tracked completion signal with a per-request grace timeout.
    ///
    /// Returns once every request has resolved or timed out, so no browser
    /// or log write is abandoned mid-flight.
    pub async fn shutdown(&self) {
        let tracked: Vec<Arc<Request>> = self
            .requests
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        info!("registry shutdown: {} tracked requests", tracked.len());
        for request in &tracked {
            if request.cancel() {
                debug!(request_id = %request.id(), "signalled cancellation for shutdown");
            }
        }

        let waits = tracked.iter().map(|request| {
            let grace = self.shutdown_grace;
            async move {
                if tokio::time::timeout(grace, request.completion().wait())
                    .await
                    .is_err()
                {
                    warn!(
                        request_id = %request.id(),
                        "request did not resolve within shutdown grace"
                    );
                }
            }
        });
        futures::future::join_all(waits).await;
        info!("registry shutdown complete");
    }
}
