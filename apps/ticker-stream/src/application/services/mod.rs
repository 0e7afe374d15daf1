//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ConnectionManager`: Connection lifecycle and the tick pipeline
//! - `TickRouter`: Payload decoding and the latest-value table
//! - `UpdateScheduler`: Frame-rate bounded batching
//! - `HeartbeatMonitor`: Periodic liveness checks

pub mod heartbeat;
pub mod manager;
pub mod router;
pub mod scheduler;

pub use heartbeat::{HeartbeatControl, HeartbeatMonitor};
pub use manager::{ConnectionManager, ManagerConfig, ManagerError};
pub use router::{RouteOutcome, TickRouter};
pub use scheduler::{DEFAULT_BATCH_INTERVAL, UpdateScheduler};
