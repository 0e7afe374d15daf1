//! Chart Series
//!
//! Fixed-capacity price series per symbol, extended with smoothstep
//! interpolated points so a rendered line moves continuously between
//! observations instead of stepping.
//!
//! # Interpolation
//!
//! For a new observation `(t, p)` following the last point `(t0, p0)`:
//!
//! ```text
//! steps    = clamp(floor((t - t0) / 250ms), 1, 4)
//! progress = i / (steps + 1)                 for i in 1..=steps
//! eased    = progress² · (3 − 2·progress)
//! point    = (t0 + (t - t0)·eased, p0 + (p - p0)·eased)
//! ```
//!
//! The real observation is always appended after its interpolated points.

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::domain::ticker::{Symbol, SymbolSet, Tick};

/// Maximum number of points retained per series.
pub const DEFAULT_SERIES_CAPACITY: usize = 60;

/// Time span covered by one interpolation step.
pub const DEFAULT_STEP_INTERVAL_MS: i64 = 250;

/// Upper bound on interpolated points per observation.
pub const DEFAULT_MAX_STEPS: u32 = 4;

// =============================================================================
// Points and Series
// =============================================================================

/// One point of a chart series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    /// Unix time in milliseconds.
    pub time_millis: i64,
    /// Price at that time.
    pub price: Decimal,
}

impl SeriesPoint {
    /// Create a point.
    #[must_use]
    pub const fn new(time_millis: i64, price: Decimal) -> Self {
        Self { time_millis, price }
    }
}

impl From<&Tick> for SeriesPoint {
    fn from(tick: &Tick) -> Self {
        Self::new(tick.observed_at_millis(), tick.last_price)
    }
}

/// Series shaping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesConfig {
    /// Points retained per symbol.
    pub capacity: usize,
    /// Time span per interpolation step in milliseconds.
    pub step_interval_ms: i64,
    /// Maximum interpolated points per observation.
    pub max_steps: u32,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SERIES_CAPACITY,
            step_interval_ms: DEFAULT_STEP_INTERVAL_MS,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Append-only series that evicts its oldest points past capacity.
#[derive(Debug, Clone)]
pub struct Series {
    points: VecDeque<SeriesPoint>,
    capacity: usize,
}

impl Series {
    /// Create an empty series.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest one if full.
    pub fn push(&mut self, point: SeriesPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Most recent point.
    #[must_use]
    pub fn last(&self) -> Option<SeriesPoint> {
        self.points.back().copied()
    }

    /// Number of points held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the series has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy the points, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<SeriesPoint> {
        self.points.iter().copied().collect()
    }
}

// =============================================================================
// Interpolation
// =============================================================================

/// Smoothstep easing: `x² · (3 − 2x)`.
#[must_use]
pub fn smoothstep(progress: Decimal) -> Decimal {
    progress * progress * (Decimal::from(3) - Decimal::TWO * progress)
}

/// Number of interpolated points for a time gap.
#[must_use]
pub fn interpolation_steps(time_diff_ms: i64, step_interval_ms: i64, max_steps: u32) -> u32 {
    let raw = time_diff_ms.div_euclid(step_interval_ms.max(1));
    let clamped = raw.clamp(1, i64::from(max_steps.max(1)));
    u32::try_from(clamped).unwrap_or(1)
}

/// Build the points that lead from `from` to `to`, ending with `to` itself.
#[must_use]
pub fn interpolate(from: SeriesPoint, to: SeriesPoint, config: &SeriesConfig) -> Vec<SeriesPoint> {
    let time_diff = to.time_millis - from.time_millis;
    let price_diff = to.price - from.price;
    let steps = interpolation_steps(time_diff, config.step_interval_ms, config.max_steps);
    let denominator = Decimal::from(steps + 1);

    let mut points = Vec::with_capacity(steps as usize + 1);
    for i in 1..=steps {
        let eased = smoothstep(Decimal::from(i) / denominator);
        let time_offset = (Decimal::from(time_diff) * eased)
            .round()
            .to_i64()
            .unwrap_or_default();
        points.push(SeriesPoint::new(
            from.time_millis + time_offset,
            from.price + price_diff * eased,
        ));
    }
    points.push(to);
    points
}

// =============================================================================
// Series Builder
// =============================================================================

/// Maintains one series per tracked symbol and extends the focused one.
#[derive(Debug)]
pub struct SeriesBuilder {
    config: SeriesConfig,
    series: HashMap<Symbol, Series>,
    focus: Symbol,
}

impl SeriesBuilder {
    /// Create a builder with an empty series for every tracked symbol.
    ///
    /// Focus starts on the first tracked symbol.
    #[must_use]
    pub fn new(symbols: &SymbolSet, config: SeriesConfig) -> Self {
        let series = symbols
            .iter()
            .map(|symbol| (symbol.clone(), Series::with_capacity(config.capacity)))
            .collect();

        Self {
            config,
            series,
            focus: symbols.first().clone(),
        }
    }

    /// Switch the focused symbol. Returns false for untracked symbols.
    ///
    /// Existing series are kept for every symbol.
    pub fn set_focus(&mut self, symbol: &str) -> bool {
        if !self.series.contains_key(symbol) {
            return false;
        }
        symbol.clone_into(&mut self.focus);
        true
    }

    /// Currently focused symbol.
    #[must_use]
    pub fn focus(&self) -> &Symbol {
        &self.focus
    }

    /// Extend `focus`'s series with the batch's ticks for that symbol.
    ///
    /// Ticks for other symbols are ignored. Returns the number of points
    /// appended (before eviction).
    pub fn on_batch(&mut self, focus: &str, batch: &[Tick]) -> usize {
        let Some(series) = self.series.get_mut(focus) else {
            return 0;
        };

        let mut appended = 0;
        for tick in batch.iter().filter(|tick| tick.symbol == focus) {
            let observed = SeriesPoint::from(tick);
            let points = match series.last() {
                Some(last) => interpolate(last, observed, &self.config),
                None => vec![observed],
            };
            appended += points.len();
            for point in points {
                series.push(point);
            }
        }

        appended
    }

    /// Current points of a symbol's series, oldest first.
    #[must_use]
    pub fn series(&self, symbol: &str) -> Vec<SeriesPoint> {
        self.series.get(symbol).map(Series::to_vec).unwrap_or_default()
    }

    /// Number of points in a symbol's series.
    #[must_use]
    pub fn series_len(&self, symbol: &str) -> usize {
        self.series.get(symbol).map_or(0, Series::len)
    }
}
