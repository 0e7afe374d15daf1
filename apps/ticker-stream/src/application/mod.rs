//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the connection manager and the services it is
//! built from, plus the port interfaces it needs from the outside world.

/// Port interfaces for external systems (socket transport, payload decoding).
pub mod ports;

/// Application services: connection management, routing, batching.
pub mod services;
