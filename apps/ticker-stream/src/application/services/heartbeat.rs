//! Heartbeat Monitor
//!
//! Periodic liveness check for an open session. The monitor only drives
//! the clock; deciding whether the session is stale belongs to the
//! connection state machine.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What the check callback wants the monitor to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatControl {
    /// Keep checking.
    Continue,
    /// Stop the monitor.
    Stop,
}

/// Runs a check callback every period until cancelled.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use ticker_stream::application::services::heartbeat::{HeartbeatControl, HeartbeatMonitor};
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let cancel = CancellationToken::new();
///     let monitor = HeartbeatMonitor::new(Duration::from_secs(5), cancel.clone());
///
///     tokio::spawn(monitor.run(|| {
///         // Inspect the age of the last frame here.
///         HeartbeatControl::Continue
///     }));
///
///     cancel.cancel();
/// }
/// ```
#[derive(Debug)]
pub struct HeartbeatMonitor {
    period: Duration,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a monitor with the given check period.
    #[must_use]
    pub const fn new(period: Duration, cancel: CancellationToken) -> Self {
        Self { period, cancel }
    }

    /// Run the monitoring loop. The first check happens one period after start.
    pub async fn run<F>(self, mut check: F)
    where
        F: FnMut() -> HeartbeatControl + Send,
    {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if check() == HeartbeatControl::Stop {
                        tracing::debug!("Heartbeat monitor stopped");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn checks_once_per_period() {
        let cancel = CancellationToken::new();
        let checks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&checks);

        let handle = tokio::spawn(
            HeartbeatMonitor::new(Duration::from_secs(5), cancel.clone()).run(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                HeartbeatControl::Continue
            }),
        );

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(checks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10_200)).await;
        assert_eq!(checks.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_loop() {
        let cancel = CancellationToken::new();
        let checks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&checks);

        HeartbeatMonitor::new(Duration::from_secs(1), cancel)
            .run(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                    HeartbeatControl::Stop
                } else {
                    HeartbeatControl::Continue
                }
            })
            .await;

        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }
}
