//! Ticker Codec
//!
//! Decodes Binance `24hrTicker` payloads. Both raw single-stream payloads
//! and combined-stream envelopes are accepted:
//!
//! ```json
//! {"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","c":"43000.10","p":"120.5","P":"0.28","h":"43500","l":"42100","v":"18234.2"}
//! {"stream":"btcusdt@ticker","data":{"e":"24hrTicker","s":"BTCUSDT",...}}
//! ```
//!
//! All price and volume fields are decimal strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{DecodeError, TickDecoder};
use crate::domain::ticker::{Tick, TickError, normalize_symbol};

/// Event type of 24h ticker payloads.
pub const TICKER_EVENT_TYPE: &str = "24hrTicker";

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload carries an event type other than `24hrTicker`.
    #[error("unexpected event type: {0}")]
    UnexpectedEvent(String),

    /// The event time is outside the representable range.
    #[error("invalid event time: {0}")]
    InvalidEventTime(i64),

    /// The decoded tick violates a field invariant.
    #[error("invalid tick: {0}")]
    InvalidTick(#[from] TickError),
}

/// 24h rolling window ticker payload.
///
/// Fields not used by the stream client are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickerMessage {
    /// Event type (`24hrTicker`).
    #[serde(rename = "e", default)]
    pub event_type: Option<String>,

    /// Event time in Unix milliseconds.
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,

    /// Symbol (e.g., "BTCUSDT")
    #[serde(rename = "s")]
    pub symbol: String,

    /// Last price
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub last_price: Decimal,

    /// Price change
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price_change: Decimal,

    /// Price change percent
    #[serde(rename = "P", with = "rust_decimal::serde::str")]
    pub price_change_percent: Decimal,

    /// High price
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    pub high_price: Decimal,

    /// Low price
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub low_price: Decimal,

    /// Total traded base asset volume
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

impl TickerMessage {
    /// Convert into a validated tick.
    ///
    /// # Errors
    ///
    /// Returns an error for a foreign event type, an out-of-range event
    /// time or a tick that fails validation.
    pub fn into_tick(self, received_at: DateTime<Utc>) -> Result<Tick, CodecError> {
        if let Some(event_type) = self.event_type
            && event_type != TICKER_EVENT_TYPE
        {
            return Err(CodecError::UnexpectedEvent(event_type));
        }

        let observed_at = match self.event_time {
            Some(millis) => DateTime::from_timestamp_millis(millis)
                .ok_or(CodecError::InvalidEventTime(millis))?,
            None => received_at,
        };

        let tick = Tick {
            symbol: normalize_symbol(&self.symbol),
            last_price: self.last_price,
            absolute_change: self.price_change,
            percent_change: self.price_change_percent,
            high_24h: self.high_price,
            low_24h: self.low_price,
            volume_24h: self.volume,
            observed_at,
        };
        tick.validate()?;
        Ok(tick)
    }
}

/// JSON codec for the 24h ticker stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinanceCodec;

impl BinanceCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one payload into a ticker message, unwrapping a combined-stream
    /// envelope if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a ticker object.
    pub fn decode_message(&self, payload: &[u8]) -> Result<TickerMessage, CodecError> {
        let mut value: serde_json::Value = serde_json::from_slice(payload)?;

        if value.get("stream").is_some_and(serde_json::Value::is_string)
            && let Some(data) = value.get_mut("data")
        {
            value = data.take();
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Decode and validate one payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid ticker.
    pub fn decode_tick(&self, payload: &[u8], received_at: DateTime<Utc>) -> Result<Tick, CodecError> {
        self.decode_message(payload)?.into_tick(received_at)
    }
}

impl TickDecoder for BinanceCodec {
    fn decode(&self, payload: &[u8], received_at: DateTime<Utc>) -> Result<Tick, DecodeError> {
        self.decode_tick(payload, received_at)
            .map_err(|e| DecodeError::new(e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
