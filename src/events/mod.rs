//! Live status events for in-flight requests

pub mod bus;
pub mod types;

pub use bus::RequestEventBus;
pub use types::{EventPayload, LogLevel, RequestEvent};
