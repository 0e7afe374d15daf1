#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Ticker Stream - Live Market Ticker Client
//!
//! Maintains one WebSocket connection to a multiplexed 24h ticker stream,
//! keeps the latest value per tracked symbol and builds a smoothed,
//! bounded price series for the focused symbol.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and state machines
//!   - `connection`: Lifecycle state machine, backoff, stats, errors
//!   - `ticker`: Ticks, tracked symbols, latest-value table
//!   - `series`: Smoothstep interpolation and bounded series
//!   - `events`: Events published to subscribers
//!
//! - **Application**: Services and port definitions
//!   - `ports`: Transport and decoder interfaces
//!   - `services`: Connection manager, tick router, update scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: Ticker codec and WebSocket transport
//!   - `broadcast`: Event fan-out
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! WebSocket ──► ConnectionManager ──► TickRouter ──► UpdateScheduler ──► SeriesBuilder
//!                     │                   │                                  │
//!                     └───────────────────┴──────────► StreamEvent ◄─────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core ticker types and lifecycle logic.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionState, ConnectionStats, DisconnectReason, StreamError};
pub use domain::events::StreamEvent;
pub use domain::series::{SeriesPoint, smoothstep};
pub use domain::ticker::{Symbol, SymbolSet, Tick};

// Services
pub use application::services::{ConnectionManager, ManagerConfig, ManagerError};

// Adapters
pub use infrastructure::binance::{BinanceCodec, WebSocketTransport};

// Infrastructure config
pub use infrastructure::config::{ConfigError, StreamConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
