//! Rolling telemetry window.
//!
//! Holds the recent call outcomes of one breaker. The breaker appends under
//! its own lock; the adapter works on a copy.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::resilience::classifier::{FailureEvent, FailureKind};

/// Hard cap on retained observations, independent of the time span.
const MAX_OBSERVATIONS: usize = 4096;

/// Number of values returned by `TelemetryWindow::features`.
pub const FEATURE_COUNT: usize = 6;

/// Feature names, in the order `features` returns them.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "failure_ratio",
    "weighted_failure_rate",
    "timeout_ratio",
    "error_ratio",
    "degraded_ratio",
    "mean_latency_secs",
];

#[derive(Debug, Clone, Copy)]
struct Observation {
    at: Instant,
    latency: Duration,
    failure: Option<FailureEvent>,
}

/// Recent outcomes bounded by a time span.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    span: Duration,
    observations: VecDeque<Observation>,
}

impl TelemetryWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            observations: VecDeque::new(),
        }
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn set_span(&mut self, span: Duration) {
        self.span = span;
    }

    pub fn record_success(&mut self, at: Instant, latency: Duration) {
        self.push(Observation {
            at,
            latency,
            failure: None,
        });
    }

    pub fn record_failure(&mut self, event: FailureEvent, latency: Duration) {
        self.push(Observation {
            at: event.at,
            latency,
            failure: Some(event),
        });
    }

    fn push(&mut self, observation: Observation) {
        self.prune(observation.at);
        if self.observations.len() == MAX_OBSERVATIONS {
            self.observations.pop_front();
        }
        self.observations.push_back(observation);
    }

    /// Drop observations older than the span, relative to `now`.
    pub fn prune(&mut self, now: Instant) {
        while let Some(front) = self.observations.front() {
            if now.saturating_duration_since(front.at) > self.span {
                self.observations.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Failures of the given kind (degraded successes included).
    pub fn count(&self, kind: FailureKind) -> usize {
        self.observations
            .iter()
            .filter(|o| o.failure.map(|f| f.kind) == Some(kind))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.observations.iter().filter(|o| o.failure.is_some()).count()
    }

    /// Sum of failure weights divided by observation count.
    pub fn weighted_failure_rate(&self) -> f64 {
        if self.observations.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .observations
            .iter()
            .filter_map(|o| o.failure.map(|f| f.weight))
            .sum();
        total / self.observations.len() as f64
    }

    /// Failure likelihood estimated from the window alone, in [0, 1].
    ///
    /// `max_weight` is the weight of the most severe kind, so a window made
    /// only of hard errors scores 1.
    pub fn observed_likelihood(&self, max_weight: f64) -> f64 {
        if max_weight <= 0.0 || !max_weight.is_finite() {
            return 0.0;
        }
        (self.weighted_failure_rate() / max_weight).clamp(0.0, 1.0)
    }

    /// Feature vector for predictors; see `FEATURE_NAMES`.
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        let n = self.observations.len();
        if n == 0 {
            return [0.0; FEATURE_COUNT];
        }
        let n_f = n as f64;
        let mean_latency = self
            .observations
            .iter()
            .map(|o| o.latency.as_secs_f64())
            .sum::<f64>()
            / n_f;

        [
            self.failures() as f64 / n_f,
            self.weighted_failure_rate(),
            self.count(FailureKind::Timeout) as f64 / n_f,
            self.count(FailureKind::Error) as f64 / n_f,
            self.count(FailureKind::Degraded) as f64 / n_f,
            mean_latency,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: FailureKind, weight: f64, at: Instant) -> FailureEvent {
        FailureEvent { kind, weight, at }
    }

    #[test]
    fn test_features() {
        let now = Instant::now();
        let mut window = TelemetryWindow::new(Duration::from_secs(60));
        window.record_success(now, Duration::from_millis(100));
        window.record_success(now, Duration::from_millis(100));
        window.record_failure(event(FailureKind::Timeout, 1.0, now), Duration::from_millis(500));
        window.record_failure(event(FailureKind::Error, 2.0, now), Duration::from_millis(100));

        let f = window.features();
        assert_eq!(f[0], 0.5);
        assert_eq!(f[1], 0.75);
        assert_eq!(f[2], 0.25);
        assert_eq!(f[3], 0.25);
        assert_eq!(f[4], 0.0);
        assert!((f[5] - 0.2).abs() < 1e-9);

        assert_eq!(window.observed_likelihood(2.0), 0.375);
    }

    #[test]
    fn test_prunes_old_observations() {
        let start = Instant::now();
        let mut window = TelemetryWindow::new(Duration::from_secs(10));
        window.record_failure(event(FailureKind::Error, 2.0, start), Duration::ZERO);
        window.record_success(start + Duration::from_secs(5), Duration::ZERO);
        assert_eq!(window.len(), 2);

        window.record_success(start + Duration::from_secs(12), Duration::ZERO);
        assert_eq!(window.len(), 2);
        assert_eq!(window.failures(), 0);
    }

    #[test]
    fn test_empty_window() {
        let window = TelemetryWindow::new(Duration::from_secs(1));
        assert!(window.is_empty());
        assert_eq!(window.features(), [0.0; FEATURE_COUNT]);
        assert_eq!(window.observed_likelihood(2.0), 0.0);
    }
}
