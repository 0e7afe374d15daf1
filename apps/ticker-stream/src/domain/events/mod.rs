//! Stream Events
//!
//! The single ordered notification channel published by the connection
//! manager. Events are emitted while the manager's state lock is held, so
//! every subscriber observes them in the order they happened.

use std::time::Duration;

use serde::Serialize;

use crate::domain::connection::{ConnectionState, DisconnectReason, StreamError};
use crate::domain::ticker::{Symbol, Tick};

/// Notification published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The connection state changed.
    StateChanged {
        /// New state.
        state: ConnectionState,
    },
    /// A valid tick for a tracked symbol was routed.
    TickReceived {
        /// The routed tick.
        tick: Tick,
    },
    /// A transport or parse error occurred.
    ErrorOccurred {
        /// The error.
        error: StreamError,
    },
    /// A reconnect was scheduled.
    Reconnecting {
        /// Attempt number (1-based).
        attempt: u32,
        /// Backoff delay before the attempt.
        #[serde(rename = "delay_ms", serialize_with = "serialize_millis")]
        delay: Duration,
        /// Why the previous session ended.
        reason: DisconnectReason,
    },
    /// The focused symbol's series was extended.
    SeriesUpdated {
        /// Focused symbol.
        symbol: Symbol,
        /// Series length after the update.
        len: usize,
    },
}

impl StreamEvent {
    /// Short label for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::TickReceived { .. } => "tick_received",
            Self::ErrorOccurred { .. } => "error_occurred",
            Self::Reconnecting { .. } => "reconnecting",
            Self::SeriesUpdated { .. } => "series_updated",
        }
    }
}

fn serialize_millis<S>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnecting_serializes_delay_in_millis() {
        let event = StreamEvent::Reconnecting {
            attempt: 2,
            delay: Duration::from_millis(2_345),
            reason: DisconnectReason::HeartbeatTimeout,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reconnecting");
        assert_eq!(json["delay_ms"], 2_345);
        assert_eq!(json["reason"], "heartbeat_timeout");
        assert_eq!(event.name(), "reconnecting");
    }

    #[test]
    fn state_changed_serializes_lowercase_state() {
        let json = serde_json::to_value(StreamEvent::StateChanged {
            state: ConnectionState::Failed,
        })
        .unwrap();
        assert_eq!(json["state"], "failed");
    }
}
