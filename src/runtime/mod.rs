//! Concurrency primitives for the request engine
//!
//! Everything here is built on `tokio::sync` and shares one rule: any wait
//! a request can park on must be cancellation-aware. The primitives are
//! small on purpose - the interesting behavior lives in how the request
//! lifecycle composes them.

pub mod cancel;
pub mod completion;
pub mod keyed_lock;
pub mod pause;
pub mod throttle;

pub use cancel::{CancelToken, checked_wait};
pub use completion::{Completion, Outcome};
pub use keyed_lock::KeyedLock;
pub use pause::{DEFAULT_PAUSE_CEILING, PauseGate};
pub use throttle::IoThrottle;
