//! WebSocket Transport
//!
//! Opens one WebSocket carrying the ticker streams of every tracked symbol:
//!
//! ```text
//! wss://stream.binance.com:9443/ws/btcusdt@ticker/ethusdt@ticker/...
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{FrameSource, InboundFrame, StreamTransport, TransportError};
use crate::domain::ticker::SymbolSet;

/// Default stream endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://stream.binance.com:9443/ws";

/// Build the stream URL: one lower-case `{symbol}@ticker` path segment per symbol.
#[must_use]
pub fn stream_url(endpoint: &str, symbols: &SymbolSet) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|symbol| format!("{}@ticker", symbol.to_ascii_lowercase()))
        .collect();

    format!("{}/{}", endpoint.trim_end_matches('/'), streams.join("/"))
}

/// WebSocket transport for the ticker stream.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: String,
}

impl WebSocketTransport {
    /// Create a transport for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Create a transport for [`DEFAULT_ENDPOINT`].
    #[must_use]
    pub fn with_default_endpoint() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }

    /// Configured endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn open(&self, symbols: &SymbolSet) -> Result<Box<dyn FrameSource>, TransportError> {
        let url = stream_url(&self.endpoint, symbols);
        tracing::info!(url = %url, "Connecting to ticker stream");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Open {
                message: e.to_string(),
            })?;

        Ok(Box::new(WebSocketFrames { stream }))
    }
}

/// Frames of one open WebSocket.
struct WebSocketFrames {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSource for WebSocketFrames {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(Ok(InboundFrame::Text(text.as_str().to_owned())));
                }
                Ok(Message::Binary(data)) => return Some(Ok(InboundFrame::Binary(data.to_vec()))),
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(TransportError::Io {
                            message: e.to_string(),
                        }));
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(frame = ?frame, "Server sent close frame");
                    return None;
                }
                Ok(Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => {
                    return Some(Err(TransportError::Io {
                        message: e.to_string(),
                    }));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error closing stream");
        }
    }
}
