//! Connection Manager
//!
//! Owns the single streaming socket and wires the lifecycle machine, the
//! tick router, the update scheduler and the series builder together.
//!
//! ```text
//! socket frames ─► TickRouter ─► UpdateScheduler ─► SeriesBuilder
//!       │              │                                  │
//!       ▼              ▼                                  ▼
//! ConnectionMachine   TickReceived                  SeriesUpdated
//!       │
//!       └─► effects: timers, open, close, StateChanged, Reconnecting
//! ```
//!
//! All mutable state lives behind one lock and every event is applied as a
//! single critical section. Events are published while the lock is held,
//! so subscribers see them in a total order.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::heartbeat::{HeartbeatControl, HeartbeatMonitor};
use super::router::{RouteOutcome, TickRouter};
use super::scheduler::{DEFAULT_BATCH_INTERVAL, UpdateScheduler};
use crate::application::ports::{InboundFrame, StreamTransport, TickDecoder};
use crate::domain::connection::{
    ConnectionMachine, ConnectionState, ConnectionStats, Effect, MachineConfig, MachineEvent,
};
use crate::domain::events::StreamEvent;
use crate::domain::series::{SeriesBuilder, SeriesConfig, SeriesPoint};
use crate::domain::ticker::{Symbol, SymbolSet, Tick, normalize_symbol};
use crate::infrastructure::broadcast::{DEFAULT_EVENT_CAPACITY, EventHub};
use crate::infrastructure::metrics::{self, TickOutcome};

// =============================================================================
// Configuration
// =============================================================================

/// Runtime configuration of the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Tracked symbols.
    pub symbols: SymbolSet,
    /// Coalescing interval of the update scheduler.
    pub batch_interval: Duration,
    /// Lifecycle timing and backoff.
    pub machine: MachineConfig,
    /// Series shaping.
    pub series: SeriesConfig,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl ManagerConfig {
    /// Configuration with default timings for the given symbols.
    #[must_use]
    pub fn new(symbols: SymbolSet) -> Self {
        Self {
            symbols,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            machine: MachineConfig::default(),
            series: SeriesConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Errors constructing a [`ConnectionManager`].
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The manager spawns its timers on the current Tokio runtime.
    #[error("connection manager must be created inside a Tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

// =============================================================================
// Internal State
// =============================================================================

/// Tick queued for the next batch.
#[derive(Debug)]
struct QueuedTick {
    /// Disconnect epoch at submit time.
    epoch: u64,
    /// Focused symbol at submit time.
    focus: Symbol,
    tick: Tick,
}

#[derive(Debug)]
struct Core {
    machine: ConnectionMachine,
    router: TickRouter,
    series: SeriesBuilder,
    /// Cancels the socket and every timer of the live session.
    session: CancellationToken,
    connect_timeout: Option<CancellationToken>,
    /// Bumped on disconnect; queued ticks from older epochs are discarded.
    epoch: u64,
}

struct Inner {
    transport: Arc<dyn StreamTransport>,
    runtime: Handle,
    hub: EventHub,
    scheduler: UpdateScheduler<QueuedTick>,
    core: Mutex<Core>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.core.get_mut().session.cancel();
        self.scheduler.clear();
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Streaming connection manager.
///
/// Cheap to clone; clones share the same connection. Dropping the last
/// clone closes the socket.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use ticker_stream::application::services::{ConnectionManager, ManagerConfig};
/// use ticker_stream::domain::ticker::SymbolSet;
/// use ticker_stream::infrastructure::binance::{BinanceCodec, WebSocketTransport};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let symbols = SymbolSet::new(["BTCUSDT", "ETHUSDT"])?;
///     let manager = ConnectionManager::new(
///         ManagerConfig::new(symbols),
///         Arc::new(WebSocketTransport::with_default_endpoint()),
///         Arc::new(BinanceCodec),
///     )?;
///
///     let mut events = manager.subscribe();
///     manager.connect();
///
///     while let Ok(event) = events.recv().await {
///         println!("{}", event.name());
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("focus", &self.focus())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a disconnected manager.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a Tokio runtime.
    pub fn new(
        config: ManagerConfig,
        transport: Arc<dyn StreamTransport>,
        decoder: Arc<dyn TickDecoder>,
    ) -> Result<Self, ManagerError> {
        let runtime = Handle::try_current()?;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let flush_target = weak.clone();
            let scheduler =
                UpdateScheduler::new(config.batch_interval, runtime.clone(), move |batch| {
                    if let Some(inner) = flush_target.upgrade() {
                        inner.apply_batch(batch);
                    }
                });

            Inner {
                transport,
                runtime,
                hub: EventHub::new(config.event_capacity),
                scheduler,
                core: Mutex::new(Core {
                    machine: ConnectionMachine::new(config.machine.clone()),
                    router: TickRouter::new(config.symbols.clone(), decoder),
                    series: SeriesBuilder::new(&config.symbols, config.series),
                    session: CancellationToken::new(),
                    connect_timeout: None,
                    epoch: 0,
                }),
            }
        });

        metrics::set_connection_state(ConnectionState::Disconnected);
        Ok(Self { inner })
    }

    /// Start connecting. No-op while connecting or connected.
    ///
    /// The `Connecting` event is published before this returns.
    pub fn connect(&self) {
        info!("Connect requested");
        self.inner.dispatch(MachineEvent::Connect);
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Nothing from the closed session is published after the
    /// `Disconnected` event.
    pub fn disconnect(&self) {
        info!("Disconnect requested");
        let mut core = self.inner.core.lock();
        core.epoch += 1;
        self.inner.scheduler.clear();
        self.inner.dispatch_locked(&mut core, MachineEvent::Disconnect);
    }

    /// Focus the series builder on a tracked symbol.
    ///
    /// Returns false, leaving the focus unchanged, for untracked symbols.
    pub fn set_focus(&self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        let changed = self.inner.core.lock().series.set_focus(&symbol);
        if changed {
            debug!(symbol = %symbol, "Focus changed");
        }
        changed
    }

    /// Currently focused symbol.
    #[must_use]
    pub fn focus(&self) -> Symbol {
        self.inner.core.lock().series.focus().clone()
    }

    /// Latest tick of a symbol.
    #[must_use]
    pub fn latest_value(&self, symbol: &str) -> Option<Tick> {
        self.inner.core.lock().router.latest(&normalize_symbol(symbol))
    }

    /// Latest tick of every symbol seen so far, in subscription order.
    #[must_use]
    pub fn latest_values(&self) -> Vec<Tick> {
        let core = self.inner.core.lock();
        core.router
            .symbols()
            .iter()
            .filter_map(|symbol| core.router.latest(symbol))
            .collect()
    }

    /// Series points of a symbol, oldest first.
    #[must_use]
    pub fn series(&self, symbol: &str) -> Vec<SeriesPoint> {
        self.inner.core.lock().series.series(&normalize_symbol(symbol))
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.inner.core.lock().machine.stats()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().machine.state()
    }

    /// Tracked symbols.
    #[must_use]
    pub fn symbols(&self) -> SymbolSet {
        self.inner.core.lock().router.symbols().clone()
    }

    /// Subscribe to stream events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.hub.subscribe()
    }
}

// =============================================================================
// Event Loop
// =============================================================================

impl Inner {
    fn dispatch(self: &Arc<Self>, event: MachineEvent) {
        let mut core = self.core.lock();
        self.dispatch_locked(&mut core, event);
    }

    fn dispatch_locked(self: &Arc<Self>, core: &mut Core, event: MachineEvent) {
        let effects = core.machine.handle(event, Instant::now());
        for effect in effects {
            self.execute(core, effect);
        }
    }

    fn execute(self: &Arc<Self>, core: &mut Core, effect: Effect) {
        match effect {
            Effect::StateChanged(state) => {
                info!(state = %state, "Connection state changed");
                metrics::set_connection_state(state);
                self.hub.publish(StreamEvent::StateChanged { state });
            }
            Effect::Error(error) => {
                warn!(kind = error.kind(), error = %error, "Stream error");
                metrics::record_error(error.kind());
                self.hub.publish(StreamEvent::ErrorOccurred { error });
            }
            Effect::CancelSession => {
                core.session.cancel();
                core.session = CancellationToken::new();
                core.connect_timeout = None;
            }
            Effect::Open { generation } => {
                self.spawn_session(generation, core.router.symbols().clone(), core.session.clone());
            }
            Effect::ArmConnectTimeout { generation, after } => {
                let token = core.session.child_token();
                core.connect_timeout = Some(token.clone());
                self.spawn_timer(
                    token,
                    after,
                    MachineEvent::ConnectTimeoutElapsed { generation },
                );
            }
            Effect::DisarmConnectTimeout { .. } => {
                if let Some(token) = core.connect_timeout.take() {
                    token.cancel();
                }
            }
            Effect::StartHeartbeat { generation, every } => {
                self.spawn_heartbeat(generation, every, core.session.clone());
            }
            Effect::ScheduleRetry {
                generation,
                attempt,
                delay,
                reason,
            } => {
                info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = reason.as_str(),
                    "Scheduling reconnect"
                );
                metrics::record_reconnect(reason);
                self.hub.publish(StreamEvent::Reconnecting {
                    attempt,
                    delay,
                    reason,
                });
                self.spawn_timer(
                    core.session.clone(),
                    delay,
                    MachineEvent::RetryDue { generation },
                );
            }
        }
    }

    fn on_frame(self: &Arc<Self>, generation: u64, frame: &InboundFrame) {
        let mut core = self.core.lock();
        if !core.machine.is_current(generation) {
            return;
        }

        metrics::record_frame_received();
        self.dispatch_locked(&mut core, MachineEvent::FrameReceived { generation });

        match core.router.route(frame.payload(), Utc::now()) {
            RouteOutcome::Routed(tick) => {
                metrics::record_tick(TickOutcome::Routed);
                self.hub.publish(StreamEvent::TickReceived { tick: tick.clone() });
                let queued = QueuedTick {
                    epoch: core.epoch,
                    focus: core.series.focus().clone(),
                    tick,
                };
                self.scheduler.submit(queued);
            }
            RouteOutcome::Untracked(symbol) => {
                metrics::record_tick(TickOutcome::Untracked);
                debug!(symbol = %symbol, "Dropping tick for untracked symbol");
            }
            RouteOutcome::Malformed(reason) => {
                metrics::record_tick(TickOutcome::Malformed);
                debug!(reason = %reason, "Dropping malformed tick");
                self.dispatch_locked(&mut core, MachineEvent::MalformedFrame { generation, reason });
            }
        }
    }

    fn apply_batch(&self, batch: Vec<QueuedTick>) {
        let mut core = self.core.lock();
        let epoch = core.epoch;
        let mut updated: Vec<Symbol> = Vec::new();
        let mut delivered = 0;

        for queued in batch.into_iter().filter(|queued| queued.epoch == epoch) {
            delivered += 1;
            let appended = core
                .series
                .on_batch(&queued.focus, std::slice::from_ref(&queued.tick));
            if appended > 0 && !updated.contains(&queued.focus) {
                updated.push(queued.focus);
            }
        }

        if delivered == 0 {
            return;
        }
        metrics::record_batch_size(delivered);

        for symbol in updated {
            let len = core.series.series_len(&symbol);
            self.hub.publish(StreamEvent::SeriesUpdated { symbol, len });
        }
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Open the socket and pump its frames until the session ends.
    fn spawn_session(self: &Arc<Self>, generation: u64, symbols: SymbolSet, cancel: CancellationToken) {
        let weak = Arc::downgrade(self);
        let transport = Arc::clone(&self.transport);

        self.runtime.spawn(async move {
            info!(generation, symbols = symbols.len(), "Opening stream");
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                result = transport.open(&symbols) => result,
            };

            let mut source = match opened {
                Ok(source) => source,
                Err(e) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.dispatch(MachineEvent::OpenFailed {
                            generation,
                            message: e.message().to_string(),
                        });
                    }
                    return;
                }
            };

            match weak.upgrade() {
                Some(inner) => inner.dispatch(MachineEvent::Opened { generation }),
                None => {
                    source.close().await;
                    return;
                }
            }

            loop {
                let frame = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!(generation, "Closing stream");
                        source.close().await;
                        return;
                    }
                    frame = source.next_frame() => frame,
                };

                let Some(inner) = weak.upgrade() else {
                    source.close().await;
                    return;
                };

                match frame {
                    Some(Ok(frame)) => inner.on_frame(generation, &frame),
                    Some(Err(e)) => {
                        inner.dispatch(MachineEvent::TransportFailed {
                            generation,
                            message: e.message().to_string(),
                        });
                        source.close().await;
                        return;
                    }
                    None => {
                        info!(generation, "Stream closed");
                        inner.dispatch(MachineEvent::TransportClosed { generation });
                        return;
                    }
                }
            }
        });
    }

    fn spawn_timer(self: &Arc<Self>, cancel: CancellationToken, delay: Duration, event: MachineEvent) {
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.dispatch(event);
                    }
                }
            }
        });
    }

    fn spawn_heartbeat(self: &Arc<Self>, generation: u64, every: Duration, cancel: CancellationToken) {
        let weak = Arc::downgrade(self);
        let monitor = HeartbeatMonitor::new(every, cancel);
        self.runtime.spawn(monitor.run(move || {
            let Some(inner) = weak.upgrade() else {
                return HeartbeatControl::Stop;
            };
            let mut core = inner.core.lock();
            if !core.machine.is_current(generation) {
                return HeartbeatControl::Stop;
            }
            inner.dispatch_locked(&mut core, MachineEvent::HeartbeatTick { generation });
            HeartbeatControl::Continue
        }));
    }
}
