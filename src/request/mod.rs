//! Request model: identity, state machine, per-request log, kinds

pub mod core;
pub mod kind;
pub mod log;
pub mod state;
pub mod types;

pub use core::Request;
pub use kind::{RequestKind, TestAction, TestPlan, TestStep};
pub use log::RequestLog;
pub use state::RequestState;
pub use types::{Owner, RequestId, RequestSnapshot};
