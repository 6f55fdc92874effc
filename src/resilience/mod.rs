//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller:
//!     → circuit_breaker.rs (admission: Closed / Open / HalfOpen)
//!     → retries.rs (half-open probe admission, retry window backoff)
//!     → timeouts.rs (bounded call budget, cooperative cancellation)
//!     → operation runs outside the breaker lock
//!     → classifier.rs (error → kind + weight)
//!     → circuit_breaker.rs (score update, maybe transition)
//!     → observers (dependency graph, monitor feed)
//! ```
//!
//! # Design Decisions
//! - The breaker decides whether to attempt a call; it never swallows the
//!   operation's own error
//! - `CallError::Open` is fail-fast and must not be retried by callers
//! - Time is read through `Clock` so every transition is testable without
//!   sleeping

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod clock;
pub mod error;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{
    BreakerCounters, BreakerStatus, CircuitBreaker, CircuitState, TransitionCause, TransitionEvent,
    TransitionObserver,
};
pub use classifier::{FailureClassifier, FailureEvent, FailureKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CallError, DegradedError, TimeoutError};
pub use retries::{probabilistic_admit, RetryScheduler};
pub use timeouts::with_timeout;
