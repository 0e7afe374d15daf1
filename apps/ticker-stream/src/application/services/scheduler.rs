//! Update Scheduler
//!
//! Frame-rate limiting coalescer. Items submitted between two flushes are
//! delivered together, at most once per interval.
//!
//! ```text
//! submit ─┬─► pending ──(interval elapsed)──► flush(batch)
//!         └─► arm timer if none is armed
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default flush interval (about 60 flushes per second).
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(16);

type FlushFn<T> = Box<dyn Fn(Vec<T>) + Send + Sync>;

struct SchedulerState<T> {
    pending: Vec<T>,
    timer: Option<CancellationToken>,
    last_flush: Option<Instant>,
}

struct Shared<T> {
    interval: Duration,
    runtime: Handle,
    flush: FlushFn<T>,
    state: Mutex<SchedulerState<T>>,
}

/// Coalesces submitted items into batches delivered at most once per interval.
///
/// The flush callback runs on a runtime task, outside the scheduler's lock.
pub struct UpdateScheduler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> std::fmt::Debug for UpdateScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("UpdateScheduler")
            .field("interval", &self.shared.interval)
            .field("pending", &state.pending.len())
            .field("armed", &state.timer.is_some())
            .finish()
    }
}

impl<T: Send + 'static> UpdateScheduler<T> {
    /// Create a scheduler that spawns its timer on `runtime`.
    pub fn new<F>(interval: Duration, runtime: Handle, flush: F) -> Self
    where
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                interval,
                runtime,
                flush: Box::new(flush),
                state: Mutex::new(SchedulerState {
                    pending: Vec::new(),
                    timer: None,
                    last_flush: None,
                }),
            }),
        }
    }

    /// Queue an item, arming a flush if none is pending.
    pub fn submit(&self, item: T) {
        let mut state = self.shared.state.lock();
        state.pending.push(item);

        if state.timer.is_none() {
            let token = CancellationToken::new();
            state.timer = Some(token.clone());
            Shared::arm(&self.shared, token, self.shared.interval);
        }
    }

    /// Drop pending items and cancel the armed flush.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.pending.clear();
        if let Some(token) = state.timer.take() {
            token.cancel();
        }
    }

    /// Number of items waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// True while a flush is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().timer.is_some()
    }

    /// Flush interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }
}

impl<T: Send + 'static> Shared<T> {
    fn arm(shared: &Arc<Self>, token: CancellationToken, delay: Duration) {
        let task_shared = Arc::clone(shared);
        shared.runtime.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => Self::fire(&task_shared, &token),
            }
        });
    }

    fn fire(shared: &Arc<Self>, token: &CancellationToken) {
        let batch = {
            let mut state = shared.state.lock();
            // Cleared between the timer firing and taking the lock.
            if token.is_cancelled() {
                return;
            }

            let now = Instant::now();
            if let Some(last) = state.last_flush {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < shared.interval {
                    Self::arm(shared, token.clone(), shared.interval - elapsed);
                    return;
                }
            }

            state.timer = None;
            state.last_flush = Some(now);
            std::mem::take(&mut state.pending)
        };

        if !batch.is_empty() {
            (shared.flush)(batch);
        }
    }
}
