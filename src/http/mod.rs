//! Aggregator HTTP surface.
//!
//! # Data Flow
//! ```text
//! Remote process (HttpSink)
//!     → POST /v1/reports (auth.rs, bearer key if configured)
//!     → handlers.rs → Aggregator::ingest
//!
//! Operators (faultline-cli)
//!     → GET /v1/status | /v1/instances | /v1/snapshot
//!     → POST /v1/breakers/{name}/reset
//! ```
//!
//! # Design Decisions
//! - Read endpoints are open; only mutating endpoints check the key
//! - Aggregated views are informational and never feed admission

pub mod auth;
pub mod handlers;
pub mod server;

pub use server::{AggregatorServer, AppState};
