//! Error types surfaced by protected calls.

use std::time::Duration;
use thiserror::Error;

/// Outcome of a protected call that did not succeed.
///
/// `Open` is routine fail-fast: callers should apply their own fallback
/// rather than retry. `Underlying` carries the operation's error verbatim.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Admission refused; the dependency is considered down.
    #[error("circuit for '{dependency}' is open, next probe in {retry_in:?}")]
    Open {
        dependency: String,
        retry_in: Duration,
    },

    /// The operation exceeded its time budget and was cancelled.
    #[error("call to '{dependency}' timed out after {after:?}")]
    Timeout { dependency: String, after: Duration },

    /// The operation's own error, unchanged.
    #[error(transparent)]
    Underlying(E),
}

impl<E> CallError<E> {
    /// True when admission was refused.
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open { .. })
    }

    /// True when the time budget expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }

    /// Recover the operation's error, if the operation ran and failed.
    pub fn into_underlying(self) -> Option<E> {
        match self {
            CallError::Underlying(e) => Some(e),
            _ => None,
        }
    }
}

/// Returned by `with_timeout` when the deadline passes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// An operation may return this to report a response that arrived but was
/// not usable (stale data, partial result).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency degraded: {reason}")]
pub struct DegradedError {
    pub reason: String,
}

impl DegradedError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
