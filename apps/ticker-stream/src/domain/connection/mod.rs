//! Connection Lifecycle Types
//!
//! Connection state, statistics, failure reasons and the error taxonomy
//! shared by the lifecycle state machine and its consumers.

mod machine;
mod reconnect;

pub use machine::{ConnectionMachine, Effect, MachineConfig, MachineEvent};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    Disconnected,
    /// Connection is being established.
    Connecting,
    /// Connection is open and receiving.
    Connected,
    /// Transient: a transport error was observed, reconnect follows.
    Error,
    /// Terminal: reconnect attempts are exhausted.
    Failed,
}

impl ConnectionState {
    /// Lower-case label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }

    /// True while a connection is open or being opened.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Disconnect Reasons
// =============================================================================

/// Why a session was torn down. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The socket could not be opened.
    OpenFailure,
    /// The socket did not open within the connect timeout.
    ConnectionTimeout,
    /// No inbound frame within the heartbeat timeout.
    HeartbeatTimeout,
    /// The remote or local side closed the socket.
    TransportClosed,
    /// The socket reported an I/O error.
    TransportError,
}

impl DisconnectReason {
    /// Snake-case label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenFailure => "open_failure",
            Self::ConnectionTimeout => "connection_timeout",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::TransportClosed => "transport_closed",
            Self::TransportError => "transport_error",
        }
    }
}

// =============================================================================
// Stream Errors
// =============================================================================

/// Errors surfaced to consumers through the event stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamError {
    /// The socket could not be established.
    #[error("failed to open stream: {message}")]
    TransportOpenFailure {
        /// Transport-level description.
        message: String,
    },
    /// Mid-session I/O error.
    #[error("stream transport error: {message}")]
    TransportError {
        /// Transport-level description.
        message: String,
    },
    /// The socket was closed.
    #[error("stream closed")]
    TransportClosed,
    /// No data arrived within the heartbeat timeout.
    #[error("no data received for {elapsed_ms}ms")]
    HeartbeatTimeout {
        /// Age of the last inbound frame.
        elapsed_ms: u64,
    },
    /// An inbound payload could not be turned into a tick.
    #[error("malformed tick: {reason}")]
    MalformedTick {
        /// Parse or validation failure.
        reason: String,
    },
    /// Automatic reconnection gave up.
    #[error("maximum reconnection attempts ({attempts}) exceeded")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl StreamError {
    /// Snake-case label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransportOpenFailure { .. } => "transport_open_failure",
            Self::TransportError { .. } => "transport_error",
            Self::TransportClosed => "transport_closed",
            Self::HeartbeatTimeout { .. } => "heartbeat_timeout",
            Self::MalformedTick { .. } => "malformed_tick",
            Self::ReconnectExhausted { .. } => "reconnect_exhausted",
        }
    }
}

// =============================================================================
// Connection Statistics
// =============================================================================

/// Read-only snapshot of connection statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionStats {
    /// Current connection state.
    pub state: ConnectionState,
    /// Inbound frames received.
    pub messages_received: u64,
    /// Transport and parse errors observed.
    pub errors: u64,
    /// Successful opens.
    pub reconnections: u64,
    /// Current backoff attempt (0 once connected).
    pub reconnect_attempts: u32,
    /// Wall-clock time of the last successful open.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Seconds since the last successful open, refreshed on heartbeat ticks.
    pub uptime_seconds: u64,
}

impl ConnectionStats {
    /// Uptime as a duration.
    #[must_use]
    pub const fn uptime(&self) -> Duration {
        Duration::from_secs(self.uptime_seconds)
    }
}
