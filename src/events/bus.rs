//! Broadcast bus for request lifecycle events

use tokio::sync::broadcast;
use tracing::trace;

use super::types::{EventPayload, RequestEvent};
use crate::request::types::RequestId;

/// Default buffered capacity per subscriber.
const DEFAULT_CAPACITY: usize = 1024;

/// Event bus for publishing and subscribing to request events.
///
/// Backed by a `tokio::sync::broadcast` channel. Publishing with no
/// subscribers is a normal condition (nobody is watching the request) and
/// is not an error; slow subscribers lag and miss events rather than
/// exerting backpressure on the engine.
#[derive(Debug)]
pub struct RequestEventBus {
    sender: broadcast::Sender<RequestEvent>,
}

impl RequestEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to all request events. Filtering by request id is the
    /// subscriber's job (the transport groups by id).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.sender.subscribe()
    }

    /// Current number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish an event; returns the number of subscribers it reached.
    pub fn publish(&self, event: RequestEvent) -> usize {
        match self.sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                trace!("request event dropped: no subscribers");
                0
            }
        }
    }

    /// Announce a client joining a request's status group.
    pub fn client_added(&self, request_id: RequestId, client: impl Into<String>) -> usize {
        self.publish(RequestEvent::new(
            request_id,
            EventPayload::ClientAdded {
                client: client.into(),
            },
        ))
    }

    /// Announce a client leaving a request's status group.
    pub fn client_removed(&self, request_id: RequestId, client: impl Into<String>) -> usize {
        self.publish(RequestEvent::new(
            request_id,
            EventPayload::ClientRemoved {
                client: client.into(),
            },
        ))
    }
}

impl Default for RequestEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
