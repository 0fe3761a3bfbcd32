pub mod accounts;
pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod executor;
pub mod registry;
pub mod request;
pub mod runtime;

pub use accounts::{AccountRecord, AccountStore, AccountSummary};
pub use browser_pool::{
    BrowserDriver, BrowserKind, BrowserPool, BrowserPoolConfig, PoolKey, SessionGuard,
};
pub use browser_setup::{ChromiumBrowser, ChromiumDriver, find_browser_executable, launch_browser};
pub use config::EngineConfig;
pub use engine::{Engine, SubmitReceipt, SubmitRequest};
pub use error::{PoolError, RequestError, RequestResult};
pub use events::{EventPayload, LogLevel, RequestEvent, RequestEventBus};
pub use registry::{AdmissionPermit, RequestRegistry};
pub use request::{
    Owner, Request, RequestId, RequestKind, RequestLog, RequestSnapshot, RequestState, TestAction,
    TestPlan, TestStep,
};
pub use runtime::{CancelToken, Completion, IoThrottle, KeyedLock, Outcome, PauseGate};

/// Production engine type: the chromiumoxide-backed driver.
pub type ChromiumEngine = engine::Engine<browser_setup::ChromiumDriver>;
