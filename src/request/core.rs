//! The request: identity, mutable status, completion, cancellation, pause
//!
//! A `Request` is the unit of work tracked by the registry. All status
//! mutation goes through [`Request::set_status`], which enforces the
//! terminal invariant: once a request reaches a terminal state its status
//! never changes again and its completion signal is already resolved.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{RequestError, RequestResult};
use crate::events::{RequestEvent, RequestEventBus};
use crate::request::kind::RequestKind;
use crate::request::log::RequestLog;
use crate::request::state::RequestState;
use crate::request::types::{Owner, RequestId, RequestSnapshot};
use crate::runtime::{CancelToken, Completion, PauseGate};

#[derive(Debug)]
struct StatusLine {
    state: RequestState,
    message: String,
}

#[derive(Debug)]
pub struct Request {
    id: RequestId,
    owner: Owner,
    kind: RequestKind,
    status: Mutex<StatusLine>,
    completion: Completion<serde_json::Value>,
    cancel: Option<CancelToken>,
    pause: PauseGate,
    log: Arc<RequestLog>,
    events: Arc<RequestEventBus>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl Request {
    /// Create a request in the `Received` state.
    ///
    /// Cancellable kinds get a token; every request gets a pause gate (only
    /// browser-bound execution observes it).
    #[must_use]
    pub fn new(
        kind: RequestKind,
        owner: Owner,
        log_dir: std::path::PathBuf,
        pause_ceiling: Duration,
        events: Arc<RequestEventBus>,
    ) -> Arc<Self> {
        let id = RequestId::generate();
        let cancel = kind.cancellable().then(CancelToken::new);
        let log = Arc::new(RequestLog::new(id, log_dir, Arc::clone(&events)));
        Arc::new(Self {
            id,
            owner,
            kind,
            status: Mutex::new(StatusLine {
                state: RequestState::Received,
                message: "received".to_string(),
            }),
            completion: Completion::new(),
            cancel,
            pause: PauseGate::new(pause_ceiling),
            log,
            events,
            created_at: chrono::Utc::now(),
        })
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    #[must_use]
    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    #[must_use]
    pub fn log(&self) -> &Arc<RequestLog> {
        &self.log
    }

    #[must_use]
    pub fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }

    #[must_use]
    pub fn completion(&self) -> &Completion<serde_json::Value> {
        &self.completion
    }

    /// The cancellation token, present only on cancellable kinds.
    #[must_use]
    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    pub async fn state(&self) -> RequestState {
        self.status.lock().await.state
    }

    pub async fn message(&self) -> String {
        self.status.lock().await.message.clone()
    }

    /// Point-in-time snapshot; `for_owner` controls whether the owner
    /// principal is included.
    pub async fn snapshot(&self, for_owner: bool) -> RequestSnapshot {
        let status = self.status.lock().await;
        RequestSnapshot {
            id: self.id,
            kind: self.kind.name(),
            state: status.state,
            message: status.message.clone(),
            created_at: self.created_at,
            owner: for_owner.then(|| self.owner.as_str().to_string()),
        }
    }

    /// Transition to `new_state`.
    ///
    /// Synchronized and idempotent at the terminal boundary: when the
    /// request is already terminal this is a no-op returning `false` and
    /// the completion signal is not re-resolved.
    ///
    /// Terminal handling:
    /// - `Failed` resolves completion with `error` (or one synthesized from
    ///   the message) and logs at error level.
    /// - `Cancelled` and `Rejected` resolve completion as cancelled;
    ///   `Rejected` additionally flushes the log immediately since the
    ///   request will never execute.
    /// - `Completed` resolves completion with `serde_json::Value::Null`;
    ///   use [`Request::complete`] to attach a result payload.
    pub async fn set_status(
        &self,
        new_state: RequestState,
        message: impl Into<String>,
        error: Option<RequestError>,
    ) -> bool {
        self.transition(new_state, message.into(), None, error).await
    }

    /// Terminal success with a result payload.
    pub async fn complete(&self, message: impl Into<String>, payload: serde_json::Value) -> bool {
        self.transition(RequestState::Completed, message.into(), Some(payload), None)
            .await
    }

    async fn transition(
        &self,
        new_state: RequestState,
        message: String,
        payload: Option<serde_json::Value>,
        error: Option<RequestError>,
    ) -> bool {
        {
            let mut status = self.status.lock().await;
            if status.state.is_terminal() {
                return false;
            }
            status.state = new_state;
            status.message = message.clone();
        }

        self.events.publish(RequestEvent::state_changed(
            self.id,
            new_state,
            message.clone(),
        ));

        match new_state {
            RequestState::Failed => {
                let error = error.unwrap_or_else(|| RequestError::Execution(message.clone()));
                self.log.error(&message).await;
                self.completion.set_error(error.shared()).await;
            }
            RequestState::Cancelled => {
                self.log.info(&message).await;
                self.completion.set_cancelled(message).await;
            }
            RequestState::Rejected => {
                self.log.warning(&message).await;
                self.completion.set_cancelled(message).await;
                // A rejected request never runs, so nothing else will flush.
                self.log.flush().await;
            }
            RequestState::Completed => {
                self.log.info(&message).await;
                self.completion
                    .set_value(payload.unwrap_or(serde_json::Value::Null))
                    .await;
            }
            _ => {
                self.log.info(&message).await;
            }
        }

        if new_state.is_terminal() {
            self.events
                .publish(RequestEvent::run_finished(self.id, new_state));
        }
        true
    }

    /// Request cancellation; returns `false` for non-cancellable kinds.
    ///
    /// Sets the flag only. The state changes when the executing task
    /// observes it at its next check point.
    pub fn cancel(&self) -> bool {
        match &self.cancel {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Observe cancellation.
    ///
    /// The only mechanism by which running or queued work notices its
    /// token: transitions to `Cancelled` and returns a cancellation error
    /// that unwinds the current execution. Called at every suspension point
    /// and between steps.
    pub async fn check_cancellation(&self) -> RequestResult<()> {
        if let Some(token) = &self.cancel
            && token.is_cancelled()
        {
            self.set_status(RequestState::Cancelled, "cancellation observed", None)
                .await;
            return Err(RequestError::Cancelled("cancellation observed".into()));
        }
        Ok(())
    }
}
