//! Stream Configuration Settings
//!
//! Configuration types for the ticker stream client, loaded from
//! `TICKER_STREAM_*` environment variables with typed defaults.

use std::time::Duration;

use crate::application::services::{DEFAULT_BATCH_INTERVAL, ManagerConfig};
use crate::domain::connection::{MachineConfig, ReconnectConfig};
use crate::domain::series::{DEFAULT_SERIES_CAPACITY, SeriesConfig};
use crate::domain::ticker::{SymbolSet, SymbolSetError, normalize_symbol};
use crate::infrastructure::binance::DEFAULT_ENDPOINT;
use crate::infrastructure::broadcast::DEFAULT_EVENT_CAPACITY;

/// Symbols tracked when none are configured.
pub const DEFAULT_SYMBOLS: [&str; 5] = ["BTCUSDT", "ETHUSDT", "BNBUSDT", "ADAUSDT", "DOTUSDT"];

/// Accepted range of the batch interval in milliseconds.
pub const BATCH_INTERVAL_RANGE_MS: (u64, u64) = (8, 1_000);

/// Stream source and pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// WebSocket endpoint the per-symbol streams are appended to.
    pub endpoint: String,
    /// Tracked symbols, in subscription order.
    pub symbols: Vec<String>,
    /// Initially focused symbol (defaults to the first tracked symbol).
    pub focus: Option<String>,
    /// Update scheduler coalescing interval.
    pub batch_interval: Duration,
    /// Points retained per series.
    pub series_capacity: usize,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            symbols: DEFAULT_SYMBOLS.iter().map(ToString::to_string).collect(),
            focus: None,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            series_capacity: DEFAULT_SERIES_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Connection lifecycle settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Maximum time to wait for the socket to open.
    pub connect_timeout: Duration,
    /// Heartbeat check period.
    pub heartbeat_interval: Duration,
    /// Maximum age of the last inbound frame.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Exclusive upper bound of the random jitter.
    pub reconnect_jitter_max: Duration,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let machine = MachineConfig::default();
        Self {
            connect_timeout: machine.connect_timeout,
            heartbeat_interval: machine.heartbeat_interval,
            heartbeat_timeout: machine.heartbeat_timeout,
            reconnect_delay_initial: machine.reconnect.initial_delay,
            reconnect_delay_max: machine.reconnect.max_delay,
            reconnect_delay_multiplier: machine.reconnect.multiplier,
            reconnect_jitter_max: machine.reconnect.max_jitter,
            max_reconnect_attempts: machine.reconnect.max_attempts,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete stream client configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamConfig {
    /// Stream source and pipeline settings.
    pub stream: StreamSettings,
    /// Connection lifecycle settings.
    pub connection: ConnectionSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the resulting
    /// configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the resulting
    /// configuration is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let stream_defaults = StreamSettings::default();
        let connection_defaults = ConnectionSettings::default();

        let stream = StreamSettings {
            endpoint: env
                .string("TICKER_STREAM_ENDPOINT")
                .unwrap_or(stream_defaults.endpoint),
            symbols: env
                .string("TICKER_STREAM_SYMBOLS")
                .map_or(stream_defaults.symbols, |list| parse_symbol_list(&list)),
            focus: env.string("TICKER_STREAM_FOCUS"),
            batch_interval: env.millis(
                "TICKER_STREAM_BATCH_INTERVAL_MS",
                stream_defaults.batch_interval,
            )?,
            series_capacity: env.parse(
                "TICKER_STREAM_SERIES_CAPACITY",
                stream_defaults.series_capacity,
            )?,
            event_capacity: env.parse(
                "TICKER_STREAM_EVENT_CAPACITY",
                stream_defaults.event_capacity,
            )?,
        };

        let connection = ConnectionSettings {
            connect_timeout: env.secs(
                "TICKER_STREAM_CONNECT_TIMEOUT_SECS",
                connection_defaults.connect_timeout,
            )?,
            heartbeat_interval: env.secs(
                "TICKER_STREAM_HEARTBEAT_INTERVAL_SECS",
                connection_defaults.heartbeat_interval,
            )?,
            heartbeat_timeout: env.secs(
                "TICKER_STREAM_HEARTBEAT_TIMEOUT_SECS",
                connection_defaults.heartbeat_timeout,
            )?,
            reconnect_delay_initial: env.millis(
                "TICKER_STREAM_RECONNECT_DELAY_INITIAL_MS",
                connection_defaults.reconnect_delay_initial,
            )?,
            reconnect_delay_max: env.millis(
                "TICKER_STREAM_RECONNECT_DELAY_MAX_MS",
                connection_defaults.reconnect_delay_max,
            )?,
            reconnect_delay_multiplier: env.parse(
                "TICKER_STREAM_RECONNECT_DELAY_MULTIPLIER",
                connection_defaults.reconnect_delay_multiplier,
            )?,
            reconnect_jitter_max: env.millis(
                "TICKER_STREAM_RECONNECT_JITTER_MAX_MS",
                connection_defaults.reconnect_jitter_max,
            )?,
            max_reconnect_attempts: env.parse(
                "TICKER_STREAM_MAX_RECONNECT_ATTEMPTS",
                connection_defaults.max_reconnect_attempts,
            )?,
        };

        let server = ServerSettings {
            health_port: env.parse(
                "TICKER_STREAM_HEALTH_PORT",
                ServerSettings::default().health_port,
            )?,
        };

        let config = Self {
            stream,
            connection,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = &self.stream.endpoint;
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConfigError::InvalidEndpoint(endpoint.clone()));
        }

        let symbols = self.symbol_set()?;
        if let Some(focus) = &self.stream.focus
            && !symbols.contains(&normalize_symbol(focus))
        {
            return Err(ConfigError::UntrackedFocus(focus.clone()));
        }

        let (min_ms, max_ms) = BATCH_INTERVAL_RANGE_MS;
        let batch_ms = u64::try_from(self.stream.batch_interval.as_millis()).unwrap_or(u64::MAX);
        if !(min_ms..=max_ms).contains(&batch_ms) {
            return Err(ConfigError::OutOfRange {
                key: "TICKER_STREAM_BATCH_INTERVAL_MS",
                reason: format!("{batch_ms} not in {min_ms}..={max_ms}"),
            });
        }

        if self.stream.series_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                key: "TICKER_STREAM_SERIES_CAPACITY",
                reason: "must be at least 1".to_string(),
            });
        }

        let connection = &self.connection;
        if connection.heartbeat_interval.is_zero() || connection.heartbeat_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                key: "TICKER_STREAM_HEARTBEAT_INTERVAL_SECS",
                reason: "heartbeat interval and timeout must be non-zero".to_string(),
            });
        }

        if connection.connect_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                key: "TICKER_STREAM_CONNECT_TIMEOUT_SECS",
                reason: "must be non-zero".to_string(),
            });
        }

        if connection.reconnect_delay_initial > connection.reconnect_delay_max {
            return Err(ConfigError::OutOfRange {
                key: "TICKER_STREAM_RECONNECT_DELAY_INITIAL_MS",
                reason: "initial delay exceeds maximum delay".to_string(),
            });
        }

        if !connection.reconnect_delay_multiplier.is_finite()
            || connection.reconnect_delay_multiplier < 1.0
        {
            return Err(ConfigError::OutOfRange {
                key: "TICKER_STREAM_RECONNECT_DELAY_MULTIPLIER",
                reason: "must be a finite value of at least 1.0".to_string(),
            });
        }

        Ok(())
    }

    /// Tracked symbols as a validated set.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list is empty or malformed.
    pub fn symbol_set(&self) -> Result<SymbolSet, ConfigError> {
        Ok(SymbolSet::new(&self.stream.symbols)?)
    }

    /// Connection manager configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list is empty or malformed.
    pub fn manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        let connection = &self.connection;
        Ok(ManagerConfig {
            symbols: self.symbol_set()?,
            batch_interval: self.stream.batch_interval,
            machine: MachineConfig {
                connect_timeout: connection.connect_timeout,
                heartbeat_interval: connection.heartbeat_interval,
                heartbeat_timeout: connection.heartbeat_timeout,
                reconnect: ReconnectConfig {
                    initial_delay: connection.reconnect_delay_initial,
                    max_delay: connection.reconnect_delay_max,
                    multiplier: connection.reconnect_delay_multiplier,
                    max_jitter: connection.reconnect_jitter_max,
                    max_attempts: connection.max_reconnect_attempts,
                },
            },
            series: SeriesConfig {
                capacity: self.stream.series_capacity,
                ..SeriesConfig::default()
            },
            event_capacity: self.stream.event_capacity,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// A setting is outside its accepted range.
    #[error("{key} out of range: {reason}")]
    OutOfRange {
        /// Variable name.
        key: &'static str,
        /// Constraint description.
        reason: String,
    },
    /// Endpoint is not a WebSocket URL.
    #[error("endpoint must start with ws:// or wss://, got {0}")]
    InvalidEndpoint(String),
    /// Symbol list is empty or malformed.
    #[error(transparent)]
    InvalidSymbols(#[from] SymbolSetError),
    /// Initial focus is not a tracked symbol.
    #[error("focus symbol {0} is not tracked")]
    UntrackedFocus(String),
}

fn parse_symbol_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|symbol| !symbol.is_empty())
        .map(ToString::to_string)
        .collect()
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.string(key) {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default.as_secs()).map(Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(key, default_ms).map(Duration::from_millis)
    }
}
