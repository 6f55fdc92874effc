//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FleetConfig (validated, immutable)
//!     → lifecycle::startup builds breakers + dependency graph
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → fleet rebuilt, breakers reused by name
//!     → atomic swap of Arc<Fleet>
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    AdapterConfig, AggregatorConfig, DependencyConfig, EdgeConfig, FailureWeights, FleetConfig,
    LogFormat, MonitorConfig, ObservabilityConfig, PredictorConfig,
};
