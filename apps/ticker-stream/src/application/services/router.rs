//! Tick Router
//!
//! Decodes inbound payloads, drops ticks for untracked symbols and keeps
//! the latest-value table current.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::ports::TickDecoder;
use crate::domain::ticker::{LatestValueTable, Symbol, SymbolSet, Tick};

/// Result of routing one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Valid tick for a tracked symbol; the latest-value table was updated.
    Routed(Tick),
    /// Valid tick for a symbol that is not tracked.
    Untracked(Symbol),
    /// Payload could not be decoded or failed validation.
    Malformed(String),
}

/// Routes decoded ticks into the latest-value table.
pub struct TickRouter {
    decoder: Arc<dyn TickDecoder>,
    symbols: SymbolSet,
    latest: LatestValueTable,
}

impl std::fmt::Debug for TickRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickRouter")
            .field("symbols", &self.symbols)
            .field("latest", &self.latest.len())
            .finish_non_exhaustive()
    }
}

impl TickRouter {
    /// Create a router for the tracked symbols.
    #[must_use]
    pub fn new(symbols: SymbolSet, decoder: Arc<dyn TickDecoder>) -> Self {
        Self {
            decoder,
            symbols,
            latest: LatestValueTable::new(),
        }
    }

    /// Decode one payload and update the table on success.
    pub fn route(&mut self, payload: &[u8], received_at: DateTime<Utc>) -> RouteOutcome {
        let tick = match self.decoder.decode(payload, received_at) {
            Ok(tick) => tick,
            Err(e) => return RouteOutcome::Malformed(e.reason),
        };

        if !self.symbols.contains(&tick.symbol) {
            return RouteOutcome::Untracked(tick.symbol);
        }

        self.latest.upsert(tick.clone());
        RouteOutcome::Routed(tick)
    }

    /// Latest tick for a symbol.
    #[must_use]
    pub fn latest(&self, symbol: &str) -> Option<Tick> {
        self.latest.get(symbol).cloned()
    }

    /// Latest tick of every symbol seen so far.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<Symbol, Tick> {
        self.latest.snapshot()
    }

    /// Tracked symbols.
    #[must_use]
    pub const fn symbols(&self) -> &SymbolSet {
        &self.symbols
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::infrastructure::binance::BinanceCodec;

    fn router() -> TickRouter {
        TickRouter::new(
            SymbolSet::new(["BTCUSDT", "ETHUSDT"]).unwrap(),
            Arc::new(BinanceCodec),
        )
    }

    fn payload(symbol: &str, price: &str) -> String {
        format!(
            r#"{{"e":"24hrTicker","E":1700000000000,"s":"{symbol}","c":"{price}","p":"1.0","P":"0.5","h":"99999","l":"1","v":"10"}}"#
        )
    }

    #[test]
    fn routes_tracked_tick_and_updates_latest() {
        let mut router = router();

        let outcome = router.route(payload("BTCUSDT", "43000.5").as_bytes(), Utc::now());

        let RouteOutcome::Routed(tick) = outcome else {
            panic!("expected routed tick, got {outcome:?}");
        };
        assert_eq!(tick.last_price, Decimal::from_str("43000.5").unwrap());
        assert_eq!(router.latest("BTCUSDT"), Some(tick));
    }

    #[test]
    fn latest_value_reflects_most_recent_tick() {
        let mut router = router();
        router.route(payload("ETHUSDT", "2000").as_bytes(), Utc::now());
        router.route(payload("ETHUSDT", "2001.25").as_bytes(), Utc::now());

        assert_eq!(
            router.latest("ETHUSDT").map(|tick| tick.last_price),
            Some(Decimal::from_str("2001.25").unwrap())
        );
        assert_eq!(router.snapshot().len(), 1);
    }

    #[test]
    fn untracked_symbol_never_enters_table() {
        let mut router = router();

        let outcome = router.route(payload("DOGEUSDT", "0.08").as_bytes(), Utc::now());

        assert_eq!(outcome, RouteOutcome::Untracked("DOGEUSDT".to_string()));
        assert!(router.latest("DOGEUSDT").is_none());
        assert!(router.snapshot().is_empty());
    }

    #[test]
    fn malformed_payload_is_swallowed() {
        let mut router = router();
        router.route(payload("BTCUSDT", "43000").as_bytes(), Utc::now());

        let outcome = router.route(br#"{"s":"BTCUSDT","c":"oops"}"#, Utc::now());

        assert!(matches!(outcome, RouteOutcome::Malformed(_)));
        assert_eq!(
            router.latest("BTCUSDT").map(|tick| tick.last_price),
            Some(Decimal::from(43_000))
        );
    }

    #[test]
    fn invalid_tick_is_malformed() {
        let mut router = router();
        let inverted = r#"{"s":"BTCUSDT","c":"10","p":"0","P":"0","h":"5","l":"9","v":"1"}"#;

        let outcome = router.route(inverted.as_bytes(), Utc::now());

        assert!(matches!(outcome, RouteOutcome::Malformed(reason) if reason.contains("below")));
        assert!(router.latest("BTCUSDT").is_none());
    }
}
