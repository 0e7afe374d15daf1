//! Domain Layer - Core ticker types and lifecycle logic.
//!
//! Pure types and state machines with no I/O. Timing is injected by the
//! application layer, which makes everything here testable without a
//! socket or a real clock.

/// Connection state, statistics, errors, backoff and the lifecycle machine.
pub mod connection;

/// Events published to stream subscribers.
pub mod events;

/// Price series with smoothstep interpolation.
pub mod series;

/// Ticks, tracked symbols and the latest-value table.
pub mod ticker;
