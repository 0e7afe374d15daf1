//! Configuration Module
//!
//! Configuration loading for the ticker stream client.

mod settings;

pub use settings::{
    BATCH_INTERVAL_RANGE_MS, ConfigError, ConnectionSettings, DEFAULT_SYMBOLS, ServerSettings,
    StreamConfig, StreamSettings,
};
