//! Reconnection Policy
//!
//! Exponential backoff with additive jitter for stream reconnection.
//!
//! ```text
//! delay(n) = min(initial · multiplier^n + jitter, max_delay)   jitter ∈ [0, max_jitter)
//! ```

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt (without jitter).
    pub initial_delay: Duration,
    /// Upper bound on any delay, jitter included.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Exclusive upper bound of the random jitter added to each delay.
    pub max_jitter: Duration,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_jitter: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

/// Reconnection policy implementing exponential backoff with jitter.
///
/// # Example
///
/// ```rust
/// use ticker_stream::domain::connection::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// // First retry waits between 1s and 2s
/// let delay = policy.next_delay().unwrap();
/// assert!(delay.as_millis() >= 1_000 && delay.as_millis() < 2_000);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay for the next attempt, advancing the attempt counter.
    ///
    /// Returns `None` once the configured attempts are used up.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let delay = self.delay_for(self.attempt_count);
        self.attempt_count += 1;
        Some(delay)
    }

    /// Delay for a given attempt index with random jitter applied.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, self.random_jitter())
    }

    /// Delay for a given attempt index with a fixed jitter.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        self.base_delay(attempt)
            .saturating_add(jitter)
            .min(self.config.max_delay)
    }

    /// Backoff delay without jitter, capped at `max_delay`.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        #[allow(clippy::cast_precision_loss)]
        let scaled =
            self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent);
        let max_millis = self.config.max_delay.as_millis();

        let millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled.round() as u128).min(max_millis)
            }
        } else if scaled.is_finite() {
            0
        } else {
            max_millis
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Borrow the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    fn random_jitter(&self) -> Duration {
        let max_jitter_ms = u64::try_from(self.config.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_jitter_ms == 0 {
            return Duration::ZERO;
        }

        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(0..max_jitter_ms))
    }
}
