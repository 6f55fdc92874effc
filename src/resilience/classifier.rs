//! Failure classification.
//!
//! # Responsibilities
//! - Map an arbitrary error to a failure kind and severity weight
//! - Flag successful but slow calls as degraded
//!
//! # Design Decisions
//! - Walks the error source chain; the first recognised link wins
//! - Caller-supplied rules run before the built-in shapes
//! - Unrecognised errors count as `Error`, the most severe kind
//! - Holds no mutable state; safe to share and call concurrently

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::FailureWeights;
use crate::resilience::error::{DegradedError, TimeoutError};

/// Failure category, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Dependency answered, but too slowly or with an unusable payload.
    Degraded,
    /// No answer within the time budget.
    Timeout,
    /// Hard failure: crash, refused connection, unknown error.
    Error,
}

impl FailureKind {
    pub const MOST_SEVERE: FailureKind = FailureKind::Error;

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Degraded => "degraded",
            FailureKind::Timeout => "timeout",
            FailureKind::Error => "error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored failure observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureEvent {
    pub kind: FailureKind,
    pub weight: f64,
    pub at: Instant,
}

/// Caller-supplied classification rule. Returning `None` defers to the
/// next rule or the built-in shapes.
pub type ClassifierRule = Arc<dyn Fn(&(dyn Error + 'static)) -> Option<FailureKind> + Send + Sync>;

/// Assigns kinds and weights to failures.
#[derive(Clone)]
pub struct FailureClassifier {
    weights: FailureWeights,
    degraded_latency: Option<Duration>,
    rules: Vec<ClassifierRule>,
}

impl fmt::Debug for FailureClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureClassifier")
            .field("weights", &self.weights)
            .field("degraded_latency", &self.degraded_latency)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl FailureClassifier {
    pub fn new(weights: FailureWeights) -> Self {
        Self {
            weights,
            degraded_latency: None,
            rules: Vec::new(),
        }
    }

    /// Replace the per-kind weights, keeping rules and latency settings.
    pub fn with_weights(mut self, weights: FailureWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Successful calls slower than `threshold` are recorded as degraded.
    pub fn with_degraded_latency(mut self, threshold: Option<Duration>) -> Self {
        self.degraded_latency = threshold;
        self
    }

    /// Add a rule consulted before the built-in shapes.
    pub fn with_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> Option<FailureKind> + Send + Sync + 'static,
    {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn weights(&self) -> &FailureWeights {
        &self.weights
    }

    pub fn weight(&self, kind: FailureKind) -> f64 {
        match kind {
            FailureKind::Timeout => self.weights.timeout,
            FailureKind::Error => self.weights.error,
            FailureKind::Degraded => self.weights.degraded,
        }
    }

    /// Score a failure of a known kind.
    pub fn event(&self, kind: FailureKind, at: Instant) -> FailureEvent {
        FailureEvent {
            kind,
            weight: self.weight(kind),
            at,
        }
    }

    /// Classify an error observed at `at`.
    pub fn classify(&self, err: &(dyn Error + 'static), at: Instant) -> FailureEvent {
        self.event(self.kind_of(err), at)
    }

    /// Degraded event for a success that took longer than allowed.
    pub fn classify_latency(&self, elapsed: Duration, at: Instant) -> Option<FailureEvent> {
        match self.degraded_latency {
            Some(limit) if elapsed > limit => Some(self.event(FailureKind::Degraded, at)),
            _ => None,
        }
    }

    /// Kind of an error, walking its source chain.
    pub fn kind_of(&self, err: &(dyn Error + 'static)) -> FailureKind {
        let mut current = Some(err);
        while let Some(link) = current {
            for rule in &self.rules {
                if let Some(kind) = rule(link) {
                    return kind;
                }
            }
            if let Some(kind) = builtin_kind(link) {
                return kind;
            }
            current = link.source();
        }
        FailureKind::MOST_SEVERE
    }
}

fn builtin_kind(err: &(dyn Error + 'static)) -> Option<FailureKind> {
    if err.is::<TimeoutError>() || err.is::<tokio::time::error::Elapsed>() {
        return Some(FailureKind::Timeout);
    }
    if err.is::<DegradedError>() {
        return Some(FailureKind::Degraded);
    }
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return match io_err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Some(FailureKind::Timeout),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Some(FailureKind::Error),
            // Other io kinds may wrap something more specific.
            _ => None,
        };
    }
    None
}
