//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process-level plumbing
//! (configuration, telemetry, metrics, health endpoint).

/// Binance ticker stream adapters (codec, WebSocket transport).
pub mod binance;

/// Broadcast channel adapter for event distribution.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing and OpenTelemetry integration.
pub mod telemetry;
