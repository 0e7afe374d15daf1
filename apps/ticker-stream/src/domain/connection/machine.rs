//! Connection State Machine
//!
//! Pure, timer-free model of the connection lifecycle. The async runtime
//! feeds it [`MachineEvent`]s and executes the returned [`Effect`]s.
//!
//! ```text
//!                 connect / retry due
//!  Disconnected ───────────────────────► Connecting ──── opened ───► Connected
//!       ▲   ▲                                 │                         │
//!       │   │ retry scheduled                 │ open failed / timeout   │ stale heartbeat,
//!       │   └─────────────────────────────────┤                         │ close, error
//!       │                                     ▼                         │
//!       │                               (Error) ─► Disconnected ◄───────┘
//!       │                                              │ attempts exhausted
//!       └──────────── connect ───────────────────── Failed
//! ```
//!
//! Every session is identified by a generation. A failure bumps the
//! generation, so any timer or frame that still carries the old one is
//! ignored and a session produces at most one failure sequence.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use super::{
    ConnectionState, ConnectionStats, DisconnectReason, ReconnectConfig, ReconnectPolicy,
    StreamError,
};

/// Timing parameters of the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    /// Maximum time to wait for the socket to open.
    pub connect_timeout: Duration,
    /// Period of the heartbeat check.
    pub heartbeat_interval: Duration,
    /// Maximum age of the last inbound frame.
    pub heartbeat_timeout: Duration,
    /// Backoff configuration.
    pub reconnect: ReconnectConfig,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    /// Consumer asked to connect.
    Connect,
    /// Consumer asked to disconnect.
    Disconnect,
    /// A scheduled backoff delay elapsed.
    RetryDue {
        /// Generation the retry was scheduled for.
        generation: u64,
    },
    /// The socket opened.
    Opened {
        /// Session generation.
        generation: u64,
    },
    /// The socket could not be opened.
    OpenFailed {
        /// Session generation.
        generation: u64,
        /// Transport description.
        message: String,
    },
    /// The connect timeout elapsed.
    ConnectTimeoutElapsed {
        /// Session generation.
        generation: u64,
    },
    /// An inbound frame arrived.
    FrameReceived {
        /// Session generation.
        generation: u64,
    },
    /// An inbound frame could not be turned into a tick.
    MalformedFrame {
        /// Session generation.
        generation: u64,
        /// Parse or validation failure.
        reason: String,
    },
    /// The heartbeat check fired.
    HeartbeatTick {
        /// Session generation.
        generation: u64,
    },
    /// The socket was closed.
    TransportClosed {
        /// Session generation.
        generation: u64,
    },
    /// The socket reported an error.
    TransportFailed {
        /// Session generation.
        generation: u64,
        /// Transport description.
        message: String,
    },
}

/// Side effects requested by the state machine, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Publish a state transition.
    StateChanged(ConnectionState),
    /// Publish an error.
    Error(StreamError),
    /// Close the socket and cancel every timer of previous sessions.
    CancelSession,
    /// Open the socket for this generation.
    Open {
        /// Session generation.
        generation: u64,
    },
    /// Arm the connect timeout.
    ArmConnectTimeout {
        /// Session generation.
        generation: u64,
        /// Timeout duration.
        after: Duration,
    },
    /// Cancel the connect timeout of this generation.
    DisarmConnectTimeout {
        /// Session generation.
        generation: u64,
    },
    /// Start the periodic heartbeat check.
    StartHeartbeat {
        /// Session generation.
        generation: u64,
        /// Check period.
        every: Duration,
    },
    /// Schedule a reconnect.
    ScheduleRetry {
        /// Generation the retry belongs to.
        generation: u64,
        /// Attempt number (1-based).
        attempt: u32,
        /// Backoff delay.
        delay: Duration,
        /// Why the previous session ended.
        reason: DisconnectReason,
    },
}

/// Connection lifecycle state machine.
#[derive(Debug)]
pub struct ConnectionMachine {
    config: MachineConfig,
    state: ConnectionState,
    generation: u64,
    policy: ReconnectPolicy,
    retry_pending: bool,
    connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    stats: ConnectionStats,
}

impl ConnectionMachine {
    /// Create a machine in the `Disconnected` state.
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        Self {
            config,
            state: ConnectionState::Disconnected,
            generation: 0,
            policy,
            retry_pending: false,
            connected_at: None,
            last_frame_at: None,
            stats: ConnectionStats::default(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current session generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// True if `generation` belongs to the live session.
    #[must_use]
    pub const fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// True while a backoff retry is scheduled.
    #[must_use]
    pub const fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            state: self.state,
            reconnect_attempts: self.policy.attempt_count(),
            ..self.stats.clone()
        }
    }

    /// Apply an event and return the effects to execute.
    pub fn handle(&mut self, event: MachineEvent, now: Instant) -> Vec<Effect> {
        match event {
            MachineEvent::Connect => self.connect(),
            MachineEvent::Disconnect => self.disconnect(),
            MachineEvent::RetryDue { generation } => self.retry_due(generation),
            MachineEvent::Opened { generation } => self.opened(generation, now),
            MachineEvent::OpenFailed {
                generation,
                message,
            } => self.open_failed(generation, message),
            MachineEvent::ConnectTimeoutElapsed { generation } => {
                self.connect_timeout_elapsed(generation)
            }
            MachineEvent::FrameReceived { generation } => self.frame_received(generation, now),
            MachineEvent::MalformedFrame { generation, reason } => {
                self.malformed_frame(generation, reason)
            }
            MachineEvent::HeartbeatTick { generation } => self.heartbeat_tick(generation, now),
            MachineEvent::TransportClosed { generation } => self.transport_closed(generation),
            MachineEvent::TransportFailed {
                generation,
                message,
            } => self.transport_failed(generation, message),
        }
    }

    // =========================================================================
    // Consumer commands
    // =========================================================================

    fn connect(&mut self) -> Vec<Effect> {
        if self.state.is_active() {
            return Vec::new();
        }

        // A manual connect during backoff keeps the attempt count.
        if !self.retry_pending {
            self.policy.reset();
        }

        self.begin_session()
    }

    fn disconnect(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.retry_pending = false;
        self.connected_at = None;
        self.last_frame_at = None;

        let mut effects = vec![Effect::CancelSession];
        self.transition(ConnectionState::Disconnected, &mut effects);
        effects
    }

    // =========================================================================
    // Session events
    // =========================================================================

    fn retry_due(&mut self, generation: u64) -> Vec<Effect> {
        if !self.is_current(generation) || !self.retry_pending {
            return Vec::new();
        }
        self.begin_session()
    }

    fn opened(&mut self, generation: u64, now: Instant) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return Vec::new();
        }

        self.policy.reset();
        self.stats.reconnections += 1;
        self.stats.last_connected_at = Some(Utc::now());
        self.stats.uptime_seconds = 0;
        self.connected_at = Some(now);
        self.last_frame_at = Some(now);

        let mut effects = vec![Effect::DisarmConnectTimeout { generation }];
        self.transition(ConnectionState::Connected, &mut effects);
        effects.push(Effect::StartHeartbeat {
            generation,
            every: self.config.heartbeat_interval,
        });
        effects
    }

    fn open_failed(&mut self, generation: u64, message: String) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return Vec::new();
        }

        self.stats.errors += 1;
        let mut effects = vec![Effect::Error(StreamError::TransportOpenFailure { message })];
        self.transition(ConnectionState::Error, &mut effects);
        self.fail(DisconnectReason::OpenFailure, &mut effects);
        effects
    }

    fn connect_timeout_elapsed(&mut self, generation: u64) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return Vec::new();
        }

        self.stats.errors += 1;
        let message = format!(
            "connection not established within {}ms",
            self.config.connect_timeout.as_millis()
        );
        let mut effects = vec![Effect::Error(StreamError::TransportOpenFailure { message })];
        self.fail(DisconnectReason::ConnectionTimeout, &mut effects);
        effects
    }

    fn frame_received(&mut self, generation: u64, now: Instant) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Connected {
            return Vec::new();
        }

        self.stats.messages_received += 1;
        self.last_frame_at = Some(now);
        Vec::new()
    }

    fn malformed_frame(&mut self, generation: u64, reason: String) -> Vec<Effect> {
        if !self.is_current(generation) {
            return Vec::new();
        }

        self.stats.errors += 1;
        vec![Effect::Error(StreamError::MalformedTick { reason })]
    }

    fn heartbeat_tick(&mut self, generation: u64, now: Instant) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Connected {
            return Vec::new();
        }

        if let Some(connected_at) = self.connected_at {
            self.stats.uptime_seconds = now.saturating_duration_since(connected_at).as_secs();
        }

        let Some(last_frame_at) = self.last_frame_at else {
            return Vec::new();
        };
        let elapsed = now.saturating_duration_since(last_frame_at);
        if elapsed <= self.config.heartbeat_timeout {
            return Vec::new();
        }

        self.stats.errors += 1;
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let mut effects = vec![Effect::Error(StreamError::HeartbeatTimeout { elapsed_ms })];
        self.fail(DisconnectReason::HeartbeatTimeout, &mut effects);
        effects
    }

    fn transport_closed(&mut self, generation: u64) -> Vec<Effect> {
        if !self.is_current(generation) || !self.state.is_active() {
            return Vec::new();
        }

        // Reported, but not counted in the error stats.
        let mut effects = vec![Effect::Error(StreamError::TransportClosed)];
        self.fail(DisconnectReason::TransportClosed, &mut effects);
        effects
    }

    fn transport_failed(&mut self, generation: u64, message: String) -> Vec<Effect> {
        if !self.is_current(generation) || !self.state.is_active() {
            return Vec::new();
        }

        self.stats.errors += 1;
        let mut effects = vec![Effect::Error(StreamError::TransportError { message })];
        self.transition(ConnectionState::Error, &mut effects);
        self.fail(DisconnectReason::TransportError, &mut effects);
        effects
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn begin_session(&mut self) -> Vec<Effect> {
        self.retry_pending = false;
        self.generation += 1;
        let generation = self.generation;

        let mut effects = vec![Effect::CancelSession];
        self.transition(ConnectionState::Connecting, &mut effects);
        effects.push(Effect::Open { generation });
        effects.push(Effect::ArmConnectTimeout {
            generation,
            after: self.config.connect_timeout,
        });
        effects
    }

    /// Tear the session down and either schedule a retry or give up.
    fn fail(&mut self, reason: DisconnectReason, effects: &mut Vec<Effect>) {
        self.generation += 1;
        self.connected_at = None;
        self.last_frame_at = None;

        effects.push(Effect::CancelSession);
        self.transition(ConnectionState::Disconnected, effects);

        match self.policy.next_delay() {
            Some(delay) => {
                self.retry_pending = true;
                effects.push(Effect::ScheduleRetry {
                    generation: self.generation,
                    attempt: self.policy.attempt_count(),
                    delay,
                    reason,
                });
            }
            None => {
                self.retry_pending = false;
                let attempts = self.policy.attempt_count();
                self.transition(ConnectionState::Failed, effects);
                effects.push(Effect::Error(StreamError::ReconnectExhausted { attempts }));
            }
        }
    }

    fn transition(&mut self, next: ConnectionState, effects: &mut Vec<Effect>) {
        if self.state != next {
            self.state = next;
            effects.push(Effect::StateChanged(next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(MachineConfig::default())
    }

    fn states(effects: &[Effect]) -> Vec<ConnectionState> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::StateChanged(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn retry_generation(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            Effect::ScheduleRetry { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    fn connected(machine: &mut ConnectionMachine, now: Instant) -> u64 {
        machine.handle(MachineEvent::Connect, now);
        let generation = machine.generation();
        machine.handle(MachineEvent::Opened { generation }, now);
        assert_eq!(machine.state(), ConnectionState::Connected);
        generation
    }

    #[test]
    fn connect_enters_connecting_and_opens() {
        let mut machine = machine();
        let effects = machine.handle(MachineEvent::Connect, Instant::now());

        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert_eq!(
            effects,
            vec![
                Effect::CancelSession,
                Effect::StateChanged(ConnectionState::Connecting),
                Effect::Open { generation: 1 },
                Effect::ArmConnectTimeout {
                    generation: 1,
                    after: Duration::from_secs(10),
                },
            ]
        );
    }

    #[test]
    fn connect_is_idempotent_while_active() {
        let mut machine = machine();
        let now = Instant::now();
        machine.handle(MachineEvent::Connect, now);
        assert!(machine.handle(MachineEvent::Connect, now).is_empty());

        let generation = machine.generation();
        machine.handle(MachineEvent::Opened { generation }, now);
        assert!(machine.handle(MachineEvent::Connect, now).is_empty());
        assert_eq!(machine.generation(), generation);
    }

    #[test]
    fn open_resets_attempts_and_updates_stats() {
        let mut machine = machine();
        let now = Instant::now();
        machine.handle(MachineEvent::Connect, now);
        let generation = machine.generation();
        let effects = machine.handle(
            MachineEvent::OpenFailed {
                generation,
                message: "refused".to_string(),
            },
            now,
        );
        let retry = retry_generation(&effects).unwrap();
        assert_eq!(machine.stats().reconnect_attempts, 1);

        machine.handle(MachineEvent::RetryDue { generation: retry }, now);
        let generation = machine.generation();
        let effects = machine.handle(MachineEvent::Opened { generation }, now);

        assert_eq!(states(&effects), vec![ConnectionState::Connected]);
        assert!(effects.contains(&Effect::DisarmConnectTimeout { generation }));
        assert!(effects.contains(&Effect::StartHeartbeat {
            generation,
            every: Duration::from_secs(5),
        }));

        let stats = machine.stats();
        assert_eq!(stats.state, ConnectionState::Connected);
        assert_eq!(stats.reconnect_attempts, 0);
        assert_eq!(stats.reconnections, 1);
        assert_eq!(stats.errors, 1);
        assert!(stats.last_connected_at.is_some());
    }

    #[test]
    fn six_open_failures_end_in_failed() {
        let mut machine = machine();
        let now = Instant::now();
        machine.handle(MachineEvent::Connect, now);

        let mut failures = 0;
        loop {
            let generation = machine.generation();
            let effects = machine.handle(
                MachineEvent::OpenFailed {
                    generation,
                    message: "refused".to_string(),
                },
                now,
            );
            failures += 1;

            match retry_generation(&effects) {
                Some(retry) => {
                    machine.handle(MachineEvent::RetryDue { generation: retry }, now);
                }
                None => {
                    assert_eq!(
                        states(&effects),
                        vec![
                            ConnectionState::Error,
                            ConnectionState::Disconnected,
                            ConnectionState::Failed,
                        ]
                    );
                    assert_eq!(
                        effects.last(),
                        Some(&Effect::Error(StreamError::ReconnectExhausted { attempts: 5 }))
                    );
                    break;
                }
            }
        }

        assert_eq!(failures, 6);
        assert_eq!(machine.state(), ConnectionState::Failed);
        assert_eq!(machine.stats().reconnect_attempts, 5);
        assert_eq!(machine.stats().errors, 6);
    }

    #[test]
    fn connect_after_failed_resets_attempts() {
        let mut machine = ConnectionMachine::new(MachineConfig {
            reconnect: ReconnectConfig {
                max_attempts: 1,
                ..ReconnectConfig::default()
            },
            ..MachineConfig::default()
        });
        let now = Instant::now();

        machine.handle(MachineEvent::Connect, now);
        let effects = machine.handle(
            MachineEvent::TransportClosed {
                generation: machine.generation(),
            },
            now,
        );
        let retry = retry_generation(&effects).unwrap();
        machine.handle(MachineEvent::RetryDue { generation: retry }, now);
        machine.handle(
            MachineEvent::TransportClosed {
                generation: machine.generation(),
            },
            now,
        );
        assert_eq!(machine.state(), ConnectionState::Failed);

        let effects = machine.handle(MachineEvent::Connect, now);
        assert_eq!(states(&effects), vec![ConnectionState::Connecting]);
        assert_eq!(machine.stats().reconnect_attempts, 0);
    }

    #[test]
    fn manual_connect_during_backoff_keeps_attempts() {
        let mut machine = machine();
        let now = Instant::now();
        let generation = connected(&mut machine, now);

        let effects = machine.handle(MachineEvent::TransportClosed { generation }, now);
        let retry = retry_generation(&effects).unwrap();
        assert!(machine.retry_pending());

        machine.handle(MachineEvent::Connect, now);
        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert_eq!(machine.stats().reconnect_attempts, 1);
        assert!(!machine.retry_pending());

        // The superseded retry timer is stale.
        assert!(
            machine
                .handle(MachineEvent::RetryDue { generation: retry }, now)
                .is_empty()
        );
    }

    #[test]
    fn transport_error_sequence() {
        let mut machine = machine();
        let now = Instant::now();
        let generation = connected(&mut machine, now);

        let effects = machine.handle(
            MachineEvent::TransportFailed {
                generation,
                message: "reset by peer".to_string(),
            },
            now,
        );

        assert_eq!(
            effects[0],
            Effect::Error(StreamError::TransportError {
                message: "reset by peer".to_string(),
            })
        );
        assert_eq!(
            states(&effects),
            vec![ConnectionState::Error, ConnectionState::Disconnected]
        );
        assert!(effects.contains(&Effect::CancelSession));
        assert!(matches!(
            effects.last(),
            Some(Effect::ScheduleRetry {
                attempt: 1,
                reason: DisconnectReason::TransportError,
                ..
            })
        ));
    }

    #[test]
    fn stale_heartbeat_triggers_exactly_one_reconnect() {
        let mut machine = machine();
        let start = Instant::now();
        let generation = connected(&mut machine, start);

        assert!(
            machine
                .handle(
                    MachineEvent::HeartbeatTick { generation },
                    start + Duration::from_secs(5),
                )
                .is_empty()
        );

        let effects = machine.handle(
            MachineEvent::HeartbeatTick { generation },
            start + Duration::from_secs(11),
        );
        assert!(effects.contains(&Effect::Error(StreamError::HeartbeatTimeout {
            elapsed_ms: 11_000,
        })));
        assert!(retry_generation(&effects).is_some());

        let again = machine.handle(
            MachineEvent::HeartbeatTick { generation },
            start + Duration::from_secs(12),
        );
        assert!(again.is_empty());
        assert_eq!(machine.stats().reconnect_attempts, 1);
    }

    #[test]
    fn frames_keep_the_session_alive() {
        let mut machine = machine();
        let start = Instant::now();
        let generation = connected(&mut machine, start);

        machine.handle(
            MachineEvent::FrameReceived { generation },
            start + Duration::from_secs(8),
        );
        let effects = machine.handle(
            MachineEvent::HeartbeatTick { generation },
            start + Duration::from_secs(15),
        );

        assert!(effects.is_empty());
        assert_eq!(machine.stats().messages_received, 1);
        assert_eq!(machine.stats().uptime_seconds, 15);
    }

    #[test]
    fn connect_timeout_fails_session() {
        let mut machine = machine();
        let now = Instant::now();
        machine.handle(MachineEvent::Connect, now);
        let generation = machine.generation();

        let effects = machine.handle(MachineEvent::ConnectTimeoutElapsed { generation }, now);

        assert_eq!(states(&effects), vec![ConnectionState::Disconnected]);
        assert!(matches!(
            effects.last(),
            Some(Effect::ScheduleRetry {
                reason: DisconnectReason::ConnectionTimeout,
                ..
            })
        ));

        // A late open of the timed-out session is ignored.
        assert!(
            machine
                .handle(MachineEvent::Opened { generation }, now)
                .is_empty()
        );
    }

    #[test]
    fn disconnect_pins_state_and_ignores_stale_events() {
        let mut machine = machine();
        let now = Instant::now();
        let generation = connected(&mut machine, now);

        let effects = machine.handle(MachineEvent::Disconnect, now);
        assert_eq!(
            effects,
            vec![
                Effect::CancelSession,
                Effect::StateChanged(ConnectionState::Disconnected),
            ]
        );

        for event in [
            MachineEvent::FrameReceived { generation },
            MachineEvent::HeartbeatTick { generation },
            MachineEvent::TransportClosed { generation },
            MachineEvent::RetryDue { generation },
            MachineEvent::MalformedFrame {
                generation,
                reason: "late".to_string(),
            },
        ] {
            assert!(machine.handle(event, now + Duration::from_secs(60)).is_empty());
        }
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn transport_close_reports_without_counting() {
        let mut machine = machine();
        let now = Instant::now();
        let generation = connected(&mut machine, now);

        let effects = machine.handle(MachineEvent::TransportClosed { generation }, now);

        assert_eq!(effects[0], Effect::Error(StreamError::TransportClosed));
        assert_eq!(states(&effects), vec![ConnectionState::Disconnected]);
        assert!(retry_generation(&effects).is_some());
        assert_eq!(machine.stats().errors, 0);
    }

    #[test]
    fn disconnect_cancels_pending_retry() {
        let mut machine = machine();
        let now = Instant::now();
        let generation = connected(&mut machine, now);
        let effects = machine.handle(MachineEvent::TransportClosed { generation }, now);
        let retry = retry_generation(&effects).unwrap();

        let effects = machine.handle(MachineEvent::Disconnect, now);
        assert_eq!(effects, vec![Effect::CancelSession]);
        assert!(
            machine
                .handle(MachineEvent::RetryDue { generation: retry }, now)
                .is_empty()
        );
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn malformed_frame_counts_error_without_state_change() {
        let mut machine = machine();
        let now = Instant::now();
        let generation = connected(&mut machine, now);

        let effects = machine.handle(
            MachineEvent::MalformedFrame {
                generation,
                reason: "missing field `c`".to_string(),
            },
            now,
        );

        assert_eq!(states(&effects), Vec::<ConnectionState>::new());
        assert_eq!(machine.stats().errors, 1);
        assert_eq!(machine.state(), ConnectionState::Connected);
    }
}
