//! Broadcast Channel Adapter
//!
//! Fan-out of [`StreamEvent`]s to any number of subscribers over a tokio
//! broadcast channel. Slow subscribers lag and lose the oldest events;
//! publishers never block.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::events::StreamEvent;

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;

/// Hub distributing stream events to subscribers.
///
/// # Example
///
/// ```rust
/// use ticker_stream::domain::connection::ConnectionState;
/// use ticker_stream::domain::events::StreamEvent;
/// use ticker_stream::infrastructure::broadcast::EventHub;
///
/// let hub = EventHub::with_defaults();
/// let mut rx = hub.subscribe();
///
/// hub.publish(StreamEvent::StateChanged { state: ConnectionState::Connecting });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Debug)]
pub struct EventHub {
    events_tx: broadcast::Sender<StreamEvent>,
}

impl EventHub {
    /// Create a hub with the given channel capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events_tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Create a hub with the default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it, or `None` if
    /// there are none.
    #[allow(clippy::must_use_candidate)]
    pub fn publish(&self, event: StreamEvent) -> Option<usize> {
        self.events_tx.send(event).ok()
    }

    /// Get a new receiver for stream events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events_tx.subscribe()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.events_tx.receiver_count()
    }
}

/// Shared event hub reference.
pub type SharedEventHub = Arc<EventHub>;

// =============================================================================
// Tests
// =============================================================================
