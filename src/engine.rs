//! Engine facade: submission, control operations, graceful shutdown
//!
//! The engine is the controller-equivalent the transport adapters call
//! into. It owns admission, registration, the spawned processing task, and
//! the single place where validate/execute errors become terminal states.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::accounts::AccountStore;
use crate::browser_pool::{BrowserDriver, BrowserKind, BrowserPool, BrowserPoolConfig, PoolKey};
use crate::config::EngineConfig;
use crate::events::RequestEventBus;
use crate::executor;
use crate::registry::RequestRegistry;
use crate::request::kind::{RequestKind, TestPlan};
use crate::request::{Owner, Request, RequestId, RequestSnapshot, RequestState};
use crate::runtime::{IoThrottle, Outcome};

/// Inbound submission model, one variant per request kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmitRequest {
    ValidateFile {
        path: PathBuf,
    },
    RunTests {
        plan: TestPlan,
        browser: BrowserKind,
        version: String,
    },
    GetSecret {
        account: String,
    },
    ResetPassword {
        account: String,
    },
    RetrieveAccounts,
    CancelRequest {
        target: RequestId,
    },
}

impl SubmitRequest {
    fn into_kind(self) -> RequestKind {
        match self {
            Self::ValidateFile { path } => RequestKind::ValidateFile { path },
            Self::RunTests {
                plan,
                browser,
                version,
            } => RequestKind::RunTests {
                plan,
                key: PoolKey::new(browser, version),
            },
            Self::GetSecret { account } => RequestKind::GetSecret { account },
            Self::ResetPassword { account } => RequestKind::ResetPassword { account },
            Self::RetrieveAccounts => RequestKind::RetrieveAccounts,
            Self::CancelRequest { target } => RequestKind::CancelRequest { target },
        }
    }
}

/// What `submit` hands back to the transport.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub id: RequestId,
    pub state: RequestState,
    pub message: String,
}

pub struct Engine<D: BrowserDriver> {
    config: EngineConfig,
    registry: Arc<RequestRegistry>,
    pool: Arc<BrowserPool<D>>,
    accounts: Arc<AccountStore>,
    events: Arc<RequestEventBus>,
    io: IoThrottle,
}

impl<D: BrowserDriver> Engine<D> {
    /// Build an engine around a driver; loads the account store.
    pub async fn new(config: EngineConfig, driver: D) -> Result<Arc<Self>> {
        let io = IoThrottle::new(config.max_concurrent_io);
        let accounts = AccountStore::load(config.account_store_path.clone(), io.clone())
            .await
            .context("failed to load account store")?;
        let pool = BrowserPool::new(
            Arc::new(driver),
            BrowserPoolConfig {
                max_active_browsers: config.max_active_browsers,
            },
        );
        let registry = Arc::new(RequestRegistry::with_shutdown_grace(
            config.max_concurrent_requests,
            config.shutdown_grace,
        ));
        let events = Arc::new(RequestEventBus::new(config.event_capacity));
        Ok(Arc::new(Self {
            config,
            registry,
            pool,
            accounts: Arc::new(accounts),
            events,
            io,
        }))
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<BrowserPool<D>> {
        &self.pool
    }

    #[must_use]
    pub fn accounts(&self) -> &Arc<AccountStore> {
        &self.accounts
    }

    #[must_use]
    pub fn events(&self) -> &Arc<RequestEventBus> {
        &self.events
    }

    #[must_use]
    pub fn io(&self) -> &IoThrottle {
        &self.io
    }

    /// Submit a request on behalf of `owner`.
    ///
    /// Heavyweight kinds pass through admission first; denial turns into a
    /// `Rejected` receipt the transport maps to "server busy, retry". An
    /// admitted request is registered and processed on a spawned task; this
    /// call returns immediately with the request id.
    pub async fn submit(self: &Arc<Self>, model: SubmitRequest, owner: Owner) -> SubmitReceipt {
        let kind = model.into_kind();
        let request = Request::new(
            kind,
            owner,
            self.config.log_dir.clone(),
            self.config.pause_ceiling,
            Arc::clone(&self.events),
        );

        let permit = if request.kind().requires_admission() {
            match self
                .registry
                .try_acquire_slot(self.config.admission_timeout)
                .await
            {
                Some(permit) => Some(permit),
                None => {
                    request
                        .set_status(RequestState::Rejected, "server busy, retry later", None)
                        .await;
                    return Self::receipt_for(&request).await;
                }
            }
        } else {
            None
        };

        self.registry.register(Arc::clone(&request));
        let receipt = Self::receipt_for(&request).await;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            // Slot held for the whole run; released exactly once when the
            // task ends.
            let _permit = permit;

            let result = executor::process(&request, &engine).await;
            match result {
                Ok(payload) => {
                    request.complete("completed", payload).await;
                }
                Err(e) if e.is_cancellation() => {
                    request
                        .set_status(RequestState::Cancelled, e.to_string(), None)
                        .await;
                }
                Err(e) => {
                    request
                        .set_status(RequestState::Failed, e.to_string(), Some(e))
                        .await;
                }
            }

            request.log().flush().await;
            engine.registry.deregister(request.id());
            debug!(request_id = %request.id(), "request finished and deregistered");
        });

        receipt
    }

    async fn receipt_for(request: &Arc<Request>) -> SubmitReceipt {
        SubmitReceipt {
            id: request.id(),
            state: request.state().await,
            message: request.message().await,
        }
    }

    /// Convenience wrapper submitting a cancellation request for `target`.
    pub async fn cancel(self: &Arc<Self>, target: RequestId, owner: Owner) -> SubmitReceipt {
        self.submit(SubmitRequest::CancelRequest { target }, owner)
            .await
    }

    /// Pause an in-flight request. Returns `false` if the id is unknown.
    pub async fn pause(&self, id: RequestId) -> bool {
        match self.registry.get(id) {
            Some(request) => {
                request.pause_gate().pause();
                request.log().info("pause requested").await;
                true
            }
            None => false,
        }
    }

    /// Release a paused request. Returns `false` if the id is unknown.
    pub async fn unpause(&self, id: RequestId) -> bool {
        match self.registry.get(id) {
            Some(request) => {
                request.pause_gate().unpause();
                true
            }
            None => false,
        }
    }

    /// Snapshots of all tracked requests. Owner principals are included
    /// only on the caller's own requests.
    pub async fn active_requests(&self, caller: &Owner) -> Vec<RequestSnapshot> {
        let tracked = self.registry.find(|_| true);
        let mut snapshots = Vec::with_capacity(tracked.len());
        for request in tracked {
            snapshots.push(request.snapshot(request.owner() == caller).await);
        }
        snapshots
    }

    /// Await a tracked request's outcome. Returns `None` when the id is no
    /// longer tracked; live-status subscribers should use the event bus
    /// instead.
    pub async fn await_result(&self, id: RequestId) -> Option<Outcome<serde_json::Value>> {
        let request = self.registry.get(id)?;
        Some(request.completion().wait().await)
    }

    /// Graceful shutdown: drain the registry, then tear down the pool.
    pub async fn shutdown(&self) {
        info!("engine shutdown requested");
        self.registry.shutdown().await;
        self.pool.shutdown().await;
        info!("engine shutdown complete");
    }
}
