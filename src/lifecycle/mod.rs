//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Metrics → Fleet → Bind aggregator
//!     → Spawn adapter, monitor, aggregator, reload tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Loops exit → Drain with deadline
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Re-read config file → Reload task
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing is spawned until config and graph are valid
//! - Shutdown has timeout: tasks still running after the deadline are aborted

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{listen, ReloadTrigger};
pub use startup::{start, Runtime, StartupError};
