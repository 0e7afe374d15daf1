//! Binance Stream Adapters
//!
//! Adapters for Binance's public 24h ticker WebSocket stream.
//!
//! - `codec`: JSON decoding of `24hrTicker` payloads into ticks
//! - `transport`: WebSocket transport over `tokio-tungstenite`
//!
//! # References
//!
//! - [Individual Symbol Ticker Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#individual-symbol-ticker-streams)

pub mod codec;
pub mod transport;

pub use codec::{BinanceCodec, CodecError, TickerMessage};
pub use transport::{DEFAULT_ENDPOINT, WebSocketTransport, stream_url};
