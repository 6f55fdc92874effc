//! Adaptive circuit breakers for fleets of interdependent services.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ CircuitBreaker::call ──▶ protected operation
//!                  │      ▲
//!     classify ◀───┘      │ threshold
//!   FailureClassifier   ThresholdAdapter ◀── TelemetryWindow + Predictor
//!                  │
//!      transition  ▼
//!   DependencyGraph ──▶ dependents (fail fast | soft pressure)
//!                  │
//!                  ▼
//!   StatusMonitor ──▶ sinks (log | channel | http) ──▶ Aggregator
//! ```
//!
//! `fleet` ties breakers, adapters and the graph together and swaps them
//! on reload; `lifecycle` starts and stops the background tasks.

// Core subsystems
pub mod adaptive;
pub mod fleet;
pub mod graph;
pub mod resilience;

// Reporting
pub mod http;
pub mod monitor;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::FleetConfig;
pub use fleet::{Fleet, FleetHandle};
pub use graph::{CascadePolicy, DependencyGraph, GraphBuilder, GraphError};
pub use lifecycle::Shutdown;
pub use monitor::{Aggregator, StatusMonitor};
pub use resilience::{CallError, CircuitBreaker, CircuitState, FailureClassifier, FailureKind};
