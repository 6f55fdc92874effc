//! Status monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! Per process, every tick (status.rs):
//!     fleet breakers → status() under each breaker's own lock
//!     → StatusSnapshot (immutable, ArcSwap-published)
//!     → ProcessReport { instance_id, sequence, snapshot }
//!     → sink.rs: LogSink | ChannelSink | HttpSink
//!
//! Central (aggregator.rs):
//!     POST /v1/reports or ChannelSink receiver
//!     → Aggregator::ingest (latest per instance, out-of-order dropped)
//!     → global_view() (worst state per dependency)
//! ```
//!
//! # Design Decisions
//! - Push, not pull: the aggregator never reaches into a process
//! - Aggregated views are eventually consistent and informational only
//! - Stale instances are evicted on a timer

pub mod aggregator;
pub mod sink;
pub mod status;
pub mod types;

pub use aggregator::{Aggregator, IngestOutcome};
pub use sink::{ChannelSink, HttpSink, LogSink, SinkError, TelemetrySink};
pub use status::{StatusMonitor, TransitionFeed};
pub use types::{DependencyView, GlobalView, InstanceSummary, ProcessReport, StatusSnapshot};
