//! Keyed browser pool with queued creation and shared reuse
//!
//! One pooled browser process per (kind, version) key, created at most once
//! per key concurrently and reused by unboundedly many request sessions.
//! Requests that arrive while a key's browser is being launched queue on
//! that key and are all resumed (or all failed) by the one launch attempt.
//! Total live browser processes across all keys are capped by a global
//! semaphore so request volume cannot translate into process count.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tracing::{debug, info, warn};

use crate::error::{PoolError, RequestResult};
use crate::request::kind::TestStep;
use crate::request::Request;
use crate::runtime::{KeyedLock, checked_wait};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the browser pool
#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    /// Maximum simultaneously live browser processes across all keys (default: 4)
    pub max_active_browsers: usize,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            max_active_browsers: 4,
        }
    }
}

// =============================================================================
// Pool key
// =============================================================================

/// Browser family a pool slot runs. All families speak CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Chromium,
    Edge,
}

impl BrowserKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
            Self::Edge => "edge",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one pool slot: a browser family at a specific version.
///
/// Case-sensitive on the version string; ("chrome", "120") and
/// ("chrome", "121") are independent slots with independent processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub browser: BrowserKind,
    pub version: String,
}

impl PoolKey {
    #[must_use]
    pub fn new(browser: BrowserKind, version: impl Into<String>) -> Self {
        Self {
            browser,
            version: version.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.browser, self.version)
    }
}

// =============================================================================
// Driver seam
// =============================================================================

/// Launches browsers and drives sessions on them.
///
/// This is the boundary between the orchestration engine and the actual
/// browser plumbing. Production uses the chromiumoxide-backed
/// [`crate::browser_setup::ChromiumDriver`]; tests substitute a fake to
/// exercise pool semantics without spawning processes.
pub trait BrowserDriver: Send + Sync + 'static {
    /// Shared browser process handle
    type Browser: Send + Sync + 'static;
    /// Request-exclusive session (context/page) on a browser
    type Session: Send + 'static;

    /// Spawn the browser process for `key`. Expensive; the pool guarantees
    /// at most one in-flight launch per key.
    fn launch(&self, key: &PoolKey) -> impl Future<Output = anyhow::Result<Self::Browser>> + Send;

    /// Open a fresh session scoped to one request. Must clean up any
    /// partially created sub-resources on failure.
    fn open_session(
        &self,
        browser: &Self::Browser,
    ) -> impl Future<Output = anyhow::Result<Self::Session>> + Send;

    /// Close a session. Best-effort; must not tear down the shared browser.
    fn close_session(&self, session: Self::Session) -> impl Future<Output = ()> + Send;

    /// Execute one test step inside a session.
    fn run_step(
        &self,
        session: &mut Self::Session,
        step: &TestStep,
    ) -> impl Future<Output = anyhow::Result<serde_json::Value>> + Send;

    /// Tear down a browser process at pool shutdown.
    fn shutdown_browser(&self, browser: Self::Browser) -> impl Future<Output = ()> + Send;
}

// =============================================================================
// Per-key slot state
// =============================================================================

type BrowserResult<D> = Result<Arc<<D as BrowserDriver>::Browser>, PoolError>;

/// State for one pool key. Mutated only while holding that key's entry in
/// the pool's `KeyedLock`.
struct Slot<D: BrowserDriver> {
    browser: Option<Arc<D::Browser>>,
    /// A launch is in flight; new arrivals join `waiters` instead of
    /// launching a second process
    pending: bool,
    waiters: Vec<oneshot::Sender<BrowserResult<D>>>,
    /// Capacity permit held for the lifetime of the live browser
    permit: Option<OwnedSemaphorePermit>,
}

impl<D: BrowserDriver> Default for Slot<D> {
    fn default() -> Self {
        Self {
            browser: None,
            pending: false,
            waiters: Vec::new(),
            permit: None,
        }
    }
}

// =============================================================================
// Browser pool
// =============================================================================

pub struct BrowserPool<D: BrowserDriver> {
    driver: Arc<D>,
    slots: DashMap<PoolKey, Slot<D>>,
    locks: KeyedLock<PoolKey>,
    /// Caps total live browser processes across all keys
    capacity: Arc<Semaphore>,
    launches: AtomicUsize,
    closed: AtomicBool,
}

impl<D: BrowserDriver> BrowserPool<D> {
    #[must_use]
    pub fn new(driver: Arc<D>, config: BrowserPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            driver,
            slots: DashMap::new(),
            locks: KeyedLock::new(),
            capacity: Arc::new(Semaphore::new(config.max_active_browsers.max(1))),
            launches: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Browser processes launched over the pool's lifetime.
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::Relaxed)
    }

    /// Acquire the shared browser for `key`, launching it if this is the
    /// first request to want it.
    ///
    /// Fast path: a live browser for `key` is handed out immediately.
    /// Otherwise the request joins the key's wait list; the first arrival
    /// also spawns the launch. The wait is cancellation-aware, so a queued
    /// request unblocks the instant it is cancelled, even while the launch
    /// (or the capacity permit it is waiting on) is still in flight.
    pub async fn acquire(
        self: &Arc<Self>,
        request: &Request,
        key: &PoolKey,
    ) -> RequestResult<Arc<D::Browser>> {
        request.check_cancellation().await?;

        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::PoolClosed.into());
        }

        let rx = {
            let _guard = self.locks.lock(key).await;
            let mut slot = self.slots.entry(key.clone()).or_default();

            if let Some(browser) = &slot.browser {
                debug!(key = %key, "pool fast path: reusing live browser");
                return Ok(Arc::clone(browser));
            }

            let (tx, rx) = oneshot::channel();
            slot.waiters.push(tx);

            let need_launch = !slot.pending;
            slot.pending = true;
            drop(slot);

            if need_launch {
                let pool = Arc::clone(self);
                let key = key.clone();
                tokio::spawn(async move { pool.launch_for_key(key).await });
            } else {
                debug!(key = %key, "pool: launch already pending, queued");
            }
            rx
        };

        request.log().info(format!("waiting for browser {key}")).await;
        match checked_wait(request.cancel_token(), rx).await? {
            Ok(Ok(browser)) => Ok(browser),
            Ok(Err(pool_err)) => Err(pool_err.into()),
            Err(_recv) => Err(PoolError::PoolClosed.into()),
        }
    }

    /// Launch the browser for `key` and resume everyone queued on it.
    ///
    /// Runs detached from any single request so one waiter's cancellation
    /// never strands the others. Exactly one of these runs per key at a
    /// time (`Slot::pending` under the keyed lock).
    async fn launch_for_key(self: Arc<Self>, key: PoolKey) {
        let permit = match self.capacity.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.fail_slot(&key, PoolError::PoolClosed).await;
                return;
            }
        };

        if self.closed.load(Ordering::SeqCst) {
            self.fail_slot(&key, PoolError::PoolClosed).await;
            return;
        }

        info!(key = %key, "launching pooled browser");
        match self.driver.launch(&key).await {
            Ok(browser) => {
                if self.closed.load(Ordering::SeqCst) {
                    // Shutdown won the race; don't park a live process in a
                    // cleared slot.
                    self.driver.shutdown_browser(browser).await;
                    self.fail_slot(&key, PoolError::PoolClosed).await;
                    return;
                }
                self.launches.fetch_add(1, Ordering::Relaxed);
                let browser = Arc::new(browser);

                let _guard = self.locks.lock(&key).await;
                let mut slot = self.slots.entry(key.clone()).or_default();
                slot.browser = Some(Arc::clone(&browser));
                slot.permit = Some(permit);
                slot.pending = false;
                let waiters = std::mem::take(&mut slot.waiters);
                drop(slot);

                debug!(key = %key, waiters = waiters.len(), "browser live, resuming waiters");
                for waiter in waiters {
                    // A closed receiver means that request was cancelled
                    // while queued; nothing to do.
                    let _ = waiter.send(Ok(Arc::clone(&browser)));
                }
            }
            Err(e) => {
                warn!(key = %key, "browser launch failed: {e:#}");
                drop(permit);
                self.fail_slot(
                    &key,
                    PoolError::Launch {
                        key: key.to_string(),
                        message: format!("{e:#}"),
                    },
                )
                .await;
            }
        }
    }

    /// Clear `pending` and fail every queued waiter with the same error.
    /// Nobody stays parked because a launch attempt died.
    async fn fail_slot(&self, key: &PoolKey, error: PoolError) {
        let _guard = self.locks.lock(key).await;
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.pending = false;
            let waiters = std::mem::take(&mut slot.waiters);
            drop(slot);
            for waiter in waiters {
                let _ = waiter.send(Err(error.clone()));
            }
        }
    }

    /// Open a request-exclusive session on a pooled browser.
    ///
    /// The returned guard closes the session on every exit path, success or
    /// failure, without ever touching the shared browser.
    pub async fn create_session(
        self: &Arc<Self>,
        request: &Request,
        browser: &Arc<D::Browser>,
    ) -> RequestResult<SessionGuard<D>> {
        request.check_cancellation().await?;

        let session = self.driver.open_session(browser).await.map_err(|e| {
            PoolError::Session {
                message: format!("{e:#}"),
            }
        })?;

        Ok(SessionGuard {
            session: Some(session),
            driver: Arc::clone(&self.driver),
        })
    }

    /// Tear down every pooled browser. Called at process shutdown, after
    /// the registry has drained in-flight requests.
    pub async fn shutdown(&self) {
        info!("shutting down browser pool");
        self.closed.store(true, Ordering::SeqCst);

        let keys: Vec<PoolKey> = self.slots.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let (browser, permit, waiters) = {
                let _guard = self.locks.lock(&key).await;
                match self.slots.get_mut(&key) {
                    Some(mut slot) => {
                        slot.pending = false;
                        (
                            slot.browser.take(),
                            slot.permit.take(),
                            std::mem::take(&mut slot.waiters),
                        )
                    }
                    None => continue,
                }
            };

            for waiter in waiters {
                let _ = waiter.send(Err(PoolError::PoolClosed));
            }

            if let Some(browser) = browser {
                match Arc::try_unwrap(browser) {
                    Ok(browser) => {
                        self.driver.shutdown_browser(browser).await;
                        debug!(key = %key, "pooled browser closed");
                    }
                    Err(_) => {
                        // Sessions still hold references; let Drop clean up.
                        warn!(key = %key, "browser has outstanding references, skipping graceful close");
                    }
                }
            }
            drop(permit);
        }
        self.slots.clear();
        info!("browser pool shutdown complete");
    }
}

// =============================================================================
// RAII session guard
// =============================================================================

/// RAII guard around a request's session; closes it on drop.
pub struct SessionGuard<D: BrowserDriver> {
    session: Option<D::Session>,
    driver: Arc<D>,
}

impl<D: BrowserDriver> SessionGuard<D> {
    /// Mutable access for step execution.
    pub fn session_mut(&mut self) -> &mut D::Session {
        self.session.as_mut().expect("session already closed")
    }

    /// Close the session now instead of from Drop.
    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            self.driver.close_session(session).await;
        }
    }
}

impl<D: BrowserDriver> Drop for SessionGuard<D> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let driver = Arc::clone(&self.driver);
            tokio::spawn(async move {
                driver.close_session(session).await;
            });
        }
    }
}
