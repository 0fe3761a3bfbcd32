//! Engine configuration
//!
//! One struct with sensible defaults and chainable setters. The daemon
//! binary populates it from environment variables; embedders set fields
//! directly.

use std::path::PathBuf;
use std::time::Duration;

use crate::runtime::DEFAULT_PAUSE_CEILING;

/// Configuration for [`crate::engine::Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global ceiling on concurrently admitted heavyweight requests
    pub max_concurrent_requests: usize,
    /// How long `submit` waits for an admission slot. Zero means fail fast
    /// (the transport maps it to a busy signal).
    pub admission_timeout: Duration,
    /// Ceiling on simultaneously live browser processes across all pool keys
    pub max_active_browsers: usize,
    /// Ceiling on concurrent file/store I/O across all request types
    pub max_concurrent_io: usize,
    /// Upper bound on a single pause before it cancels the request
    pub pause_ceiling: Duration,
    /// Per-request wait during graceful shutdown
    pub shutdown_grace: Duration,
    /// Root folder for per-request log files (opaque to the engine core)
    pub log_dir: PathBuf,
    /// Location of the JSON test-account store
    pub account_store_path: PathBuf,
    /// Run pooled browsers headless
    pub headless: bool,
    /// Event bus capacity per subscriber
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 8,
            admission_timeout: Duration::ZERO,
            max_active_browsers: 4,
            max_concurrent_io: 16,
            pause_ceiling: DEFAULT_PAUSE_CEILING,
            shutdown_grace: Duration::from_secs(30),
            log_dir: std::env::temp_dir().join("testrig_logs"),
            account_store_path: PathBuf::from("testrig_accounts.json"),
            headless: true,
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    #[must_use]
    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_active_browsers(mut self, max: usize) -> Self {
        self.max_active_browsers = max;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_io(mut self, max: usize) -> Self {
        self.max_concurrent_io = max;
        self
    }

    #[must_use]
    pub fn with_pause_ceiling(mut self, ceiling: Duration) -> Self {
        self.pause_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    #[must_use]
    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = dir;
        self
    }

    #[must_use]
    pub fn with_account_store_path(mut self, path: PathBuf) -> Self {
        self.account_store_path = path;
        self
    }

    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}
