//! Dependency graph subsystem.
//!
//! # Data Flow
//! ```text
//! Startup / reload:
//!     FleetConfig.edges
//!     → builder.rs (unknown names, duplicates, cycles rejected per edge)
//!     → build(): frozen DependencyGraph, subscribed to every breaker
//!
//! Runtime:
//!     child breaker opens
//!     → DependencyGraph::on_transition
//!     → dependency.rs::notify (BFS over dependents)
//!         FailFast     → parent.request_open(origin)
//!         SoftPressure → parent.apply_pressure(weight, origin)
//! ```
//!
//! # Design Decisions
//! - Edges are fixed at build time; reconfiguration builds a new graph
//! - Cycle detection runs per insertion, so an invalid edge never lands
//! - Policy is per edge, not global

pub mod builder;
pub mod dependency;
pub mod types;

pub use builder::GraphBuilder;
pub use dependency::{CascadeReport, DependencyGraph};
pub use types::{CascadePolicy, DependencyEdge, GraphError};
