//! Per-request cooperative pause gate
//!
//! Operators can suspend a long-running request between logical steps
//! without severing its browser session. The executing task calls
//! [`PauseGate::wait_if_paused`] at step boundaries; `pause`/`unpause`
//! flip the gate from the outside. The wait is bounded by a ceiling and
//! linked to cancellation so a paused request can never hang forever.

use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{RequestError, RequestResult};
use crate::request::RequestLog;
use crate::runtime::cancel::CancelToken;

/// Default ceiling on a single pause (10 minutes).
pub const DEFAULT_PAUSE_CEILING: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
pub struct PauseGate {
    paused: Mutex<bool>,
    release: Notify,
    ceiling: Duration,
}

impl PauseGate {
    #[must_use]
    pub fn new(ceiling: Duration) -> Self {
        Self {
            paused: Mutex::new(false),
            release: Notify::new(),
            ceiling,
        }
    }

    /// Mark the request paused. The executing task will hold at its next
    /// step boundary.
    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    /// Clear the paused flag and release the waiter, if any.
    ///
    /// Best-effort and idempotent: unpausing an already-running request is
    /// not an error and wakes nobody.
    pub fn unpause(&self) {
        let mut paused = self.paused.lock();
        if *paused {
            *paused = false;
            self.release.notify_one();
        }
    }

    /// True while the gate is set.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Hold here while paused.
    ///
    /// Returns immediately when not paused. Otherwise blocks until
    /// `unpause`, cancellation, or the ceiling - whichever comes first.
    /// Exceeding the ceiling raises [`RequestError::PauseTimeout`], a
    /// cancellation-class error that unwinds the run.
    pub async fn wait_if_paused(
        &self,
        log: &Arc<RequestLog>,
        cancel: Option<&CancelToken>,
    ) -> RequestResult<()> {
        if !self.is_paused() {
            return Ok(());
        }
        log.info("execution paused").await;

        let deadline = tokio::time::Instant::now() + self.ceiling;
        loop {
            // Register for the release signal before re-checking the flag;
            // a stale notify_one permit just causes one extra loop turn.
            let released = self.release.notified();
            if !self.is_paused() {
                log.info("execution unpaused").await;
                return Ok(());
            }
            let wait = async {
                match cancel {
                    Some(token) => {
                        tokio::select! {
                            biased;
                            () = token.wait() => Err(RequestError::Cancelled(
                                "cancelled while paused".into(),
                            )),
                            () = released => Ok(()),
                        }
                    }
                    None => {
                        released.await;
                        Ok(())
                    }
                }
            };
            match tokio::time::timeout_at(deadline, wait).await {
                Ok(Ok(())) => {} // released (or stale permit) - loop re-checks the flag
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    log.warning("pause exceeded the configured limit").await;
                    return Err(RequestError::PauseTimeout);
                }
            }
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new(DEFAULT_PAUSE_CEILING)
    }
}
