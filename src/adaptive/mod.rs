//! Threshold adaptation subsystem.
//!
//! # Data Flow
//! ```text
//! Every adapter tick (threshold.rs::run_adapter_loop):
//!     for each breaker in the fleet:
//!         → breaker.telemetry() (copy of window.rs, pruned to now)
//!         → window.features()
//!         → predictor.rs (optional, likelihood in [0, 1])
//!         → threshold.rs (map, smooth, clamp to [min, max])
//!         → breaker.set_threshold()
//! ```
//!
//! # Design Decisions
//! - Never runs on the call path; prediction latency cannot slow a call
//! - Only inference is consumed; coefficients come from configuration
//! - Any predictor misbehaviour degrades to the last-known threshold

pub mod predictor;
pub mod threshold;
pub mod window;

pub use predictor::{FnPredictor, LogisticPredictor, PredictError, Predictor};
pub use threshold::{run_adapter_loop, ThresholdAdapter};
pub use window::{TelemetryWindow, FEATURE_COUNT, FEATURE_NAMES};
