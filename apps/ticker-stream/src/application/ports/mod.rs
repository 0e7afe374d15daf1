//! Port Interfaces
//!
//! Contracts between the connection manager and the outside world,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamTransport`: Opens the single streaming socket for a symbol set
//! - `FrameSource`: Yields inbound frames of one open socket
//! - `TickDecoder`: Turns a wire payload into a validated `Tick`

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ticker::{SymbolSet, Tick};

// =============================================================================
// Frames
// =============================================================================

/// Data frame received from the stream.
///
/// Control frames (ping, pong) are handled by the transport and never
/// surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame, expected to hold UTF-8 JSON.
    Binary(Vec<u8>),
}

impl InboundFrame {
    /// Raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("connection failed: {message}")]
    Open {
        /// Error details.
        message: String,
    },
    /// The open socket failed.
    #[error("stream I/O error: {message}")]
    Io {
        /// Error details.
        message: String,
    },
}

impl TransportError {
    /// Error details without the variant prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Open { message } | Self::Io { message } => message,
        }
    }
}

/// Opens the streaming socket.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open one socket carrying the ticker streams of every symbol.
    async fn open(&self, symbols: &SymbolSet) -> Result<Box<dyn FrameSource>, TransportError>;
}

/// Inbound side of an open socket.
#[async_trait]
pub trait FrameSource: Send {
    /// Next data frame. `None` once the socket is closed.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;

    /// Close the socket. Errors while closing are ignored.
    async fn close(&mut self);
}

// =============================================================================
// Decoding
// =============================================================================

/// Payload that could not be turned into a tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DecodeError {
    /// Parse or validation failure.
    pub reason: String,
}

impl DecodeError {
    /// Create a decode error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Decodes wire payloads into ticks.
pub trait TickDecoder: Send + Sync {
    /// Decode and validate one payload.
    ///
    /// `received_at` is used as the observation time when the payload
    /// carries no event time.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not a valid tick.
    fn decode(&self, payload: &[u8], received_at: DateTime<Utc>) -> Result<Tick, DecodeError>;
}
