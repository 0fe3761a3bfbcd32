//! The closed set of request kinds
//!
//! Request behavior is dispatched over this tagged union rather than a type
//! hierarchy. A kind is either cancellable (long-running work that polls its
//! token) or not (short operations and the cancellation request itself,
//! which must never be cancelled mid-flight).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::browser_pool::PoolKey;
use crate::request::types::RequestId;

/// A single action inside a test plan.
///
/// The engine owns ordering, pause, cancel and logging around steps; what an
/// action *means* is the browser driver's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestAction {
    Navigate { url: String },
    Click { selector: String },
    Type { selector: String, text: String },
    Evaluate { script: String },
    WaitMillis { millis: u64 },
}

/// A named step of a test plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStep {
    pub name: String,
    #[serde(flatten)]
    pub action: TestAction,
}

/// A parsed test plan, handed to the engine by the ingest adapters.
///
/// Parsing spreadsheet/CSV step files into this shape happens outside the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    pub name: String,
    pub steps: Vec<TestStep>,
}

/// What a request does.
#[derive(Debug, Clone)]
pub enum RequestKind {
    /// Structural checks on an uploaded step file
    ValidateFile { path: PathBuf },
    /// Run a test plan against a pooled browser
    RunTests { plan: TestPlan, key: PoolKey },
    /// Fetch a stored credential (owner-only result)
    GetSecret { account: String },
    /// Rotate a stored credential to a freshly generated password
    ResetPassword { account: String },
    /// List known test accounts, secrets redacted
    RetrieveAccounts,
    /// Cancel another in-flight request by id
    CancelRequest { target: RequestId },
}

impl RequestKind {
    /// Stable name used in snapshots and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ValidateFile { .. } => "validate_file",
            Self::RunTests { .. } => "run_tests",
            Self::GetSecret { .. } => "get_secret",
            Self::ResetPassword { .. } => "reset_password",
            Self::RetrieveAccounts => "retrieve_accounts",
            Self::CancelRequest { .. } => "cancel_request",
        }
    }

    /// Whether this kind carries a cancellation token.
    #[must_use]
    pub fn cancellable(&self) -> bool {
        matches!(self, Self::ValidateFile { .. } | Self::RunTests { .. })
    }

    /// Whether admission control gates this kind.
    ///
    /// Only the heavyweight operations count against the global request
    /// ceiling; lookups and control operations always get through.
    #[must_use]
    pub fn requires_admission(&self) -> bool {
        matches!(self, Self::ValidateFile { .. } | Self::RunTests { .. })
    }
}
