//! Ticker Domain Types
//!
//! Normalized 24h ticker observations, the tracked symbol set and the
//! latest-value table keyed by symbol.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

// =============================================================================
// Symbols
// =============================================================================

/// A symbol string (exchange pair such as `BTCUSDT`).
pub type Symbol = String;

/// Normalize a symbol to its upper-case exchange form.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Symbol {
    raw.trim().to_ascii_uppercase()
}

/// Errors building a [`SymbolSet`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolSetError {
    /// No symbols were given.
    #[error("symbol set cannot be empty")]
    Empty,
    /// A symbol is empty or not alphanumeric ASCII.
    #[error("invalid symbol '{0}': must be non-empty alphanumeric ASCII")]
    Invalid(String),
}

/// Ordered, duplicate-free set of tracked symbols.
///
/// The order is the subscription order and the order snapshots are listed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSet {
    symbols: Vec<Symbol>,
}

impl SymbolSet {
    /// Build a symbol set, normalizing case and dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns an error if the set is empty or a symbol is malformed.
    pub fn new<I, S>(symbols: I) -> Result<Self, SymbolSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<Symbol> = Vec::new();
        for raw in symbols {
            let symbol = normalize_symbol(raw.as_ref());
            if symbol.is_empty() || !symbol.chars().all(|ch| ch.is_ascii_alphanumeric()) {
                return Err(SymbolSetError::Invalid(raw.as_ref().to_string()));
            }
            if !normalized.contains(&symbol) {
                normalized.push(symbol);
            }
        }

        if normalized.is_empty() {
            return Err(SymbolSetError::Empty);
        }

        Ok(Self {
            symbols: normalized,
        })
    }

    /// Check whether a symbol is tracked.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Iterate symbols in subscription order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// First tracked symbol.
    #[must_use]
    pub fn first(&self) -> &Symbol {
        // Non-empty by construction.
        &self.symbols[0]
    }

    /// Number of tracked symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; kept for API symmetry with collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Borrow the symbols as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Symbol] {
        &self.symbols
    }
}

// =============================================================================
// Tick
// =============================================================================

/// One normalized 24h ticker observation for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tick {
    /// Exchange symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub last_price: Decimal,
    /// Absolute price change over 24h.
    pub absolute_change: Decimal,
    /// Percent price change over 24h.
    pub percent_change: Decimal,
    /// 24h high.
    pub high_24h: Decimal,
    /// 24h low.
    pub low_24h: Decimal,
    /// 24h base asset volume.
    pub volume_24h: Decimal,
    /// When the observation was made (exchange event time when available).
    pub observed_at: DateTime<Utc>,
}

impl Tick {
    /// Observation time as Unix milliseconds.
    #[must_use]
    pub fn observed_at_millis(&self) -> i64 {
        self.observed_at.timestamp_millis()
    }

    /// Check the field-level invariants of a tick.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), TickError> {
        if self.symbol.is_empty() {
            return Err(TickError::EmptySymbol);
        }

        let non_negative = [
            ("last_price", self.last_price),
            ("high_24h", self.high_24h),
            ("low_24h", self.low_24h),
            ("volume_24h", self.volume_24h),
        ];
        for (field, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(TickError::Negative { field });
            }
        }

        if self.high_24h < self.low_24h {
            return Err(TickError::InvertedRange {
                high: self.high_24h,
                low: self.low_24h,
            });
        }

        Ok(())
    }
}

/// Tick validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    /// Symbol field was empty.
    #[error("tick symbol is empty")]
    EmptySymbol,
    /// A field that must be non-negative was negative.
    #[error("tick field {field} is negative")]
    Negative {
        /// Offending field name.
        field: &'static str,
    },
    /// 24h high was below 24h low.
    #[error("tick high {high} is below low {low}")]
    InvertedRange {
        /// 24h high.
        high: Decimal,
        /// 24h low.
        low: Decimal,
    },
}

// =============================================================================
// Latest Value Table
// =============================================================================

/// Most recent tick per tracked symbol.
///
/// Entries only exist for symbols that have been seen at least once and are
/// replaced wholesale on every update.
#[derive(Debug, Clone, Default)]
pub struct LatestValueTable {
    entries: HashMap<Symbol, Tick>,
}

impl LatestValueTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for the tick's symbol, returning the previous tick.
    pub fn upsert(&mut self, tick: Tick) -> Option<Tick> {
        self.entries.insert(tick.symbol.clone(), tick)
    }

    /// Latest tick for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&Tick> {
        self.entries.get(symbol)
    }

    /// Number of symbols with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no tick has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone the whole table.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<Symbol, Tick> {
        self.entries.clone()
    }
}
