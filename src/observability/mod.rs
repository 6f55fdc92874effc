//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, graph, monitor produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields everywhere (`dependency = %name`), never formatted
//!   into the message
//! - Metrics are cheap and optional; nothing depends on a recorder

pub mod logging;
pub mod metrics;
