//! Dynamic threshold adaptation.
//!
//! # Responsibilities
//! - Turn a telemetry window into the next open threshold
//! - Keep every output inside the configured [min, max] band
//! - Run on a fixed cadence, off the call path
//!
//! # Design Decisions
//! - High failure likelihood lowers the threshold (open sooner); low
//!   likelihood raises it toward max
//! - New targets are EWMA-smoothed to avoid threshold flapping
//! - A failing or nonsensical predictor never disables the breaker: the
//!   last-known threshold is kept
//! - Windows with too few samples carry no evidence and keep the last value

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::adaptive::predictor::{LogisticPredictor, Predictor};
use crate::adaptive::window::TelemetryWindow;
use crate::config::{AdapterConfig, DependencyConfig};
use crate::fleet::FleetHandle;

/// Computes thresholds for one breaker.
#[derive(Debug)]
pub struct ThresholdAdapter {
    min: f64,
    max: f64,
    smoothing: f64,
    min_samples: usize,
    max_weight: f64,
    predictor: Option<Arc<dyn Predictor>>,
    last: Mutex<f64>,
}

impl ThresholdAdapter {
    /// Adapter with the given clamp band, starting from `initial`.
    pub fn new(min: f64, max: f64, initial: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let mut adapter = Self {
            min,
            max,
            smoothing: 1.0,
            min_samples: 1,
            max_weight: 1.0,
            predictor: None,
            last: Mutex::new(initial),
        };
        adapter.last = Mutex::new(adapter.clamp(initial));
        adapter
    }

    pub fn from_config(dep: &DependencyConfig, adapter: &AdapterConfig) -> Self {
        let w = &dep.failure_weights;
        let built = Self::new(dep.min_threshold, dep.max_threshold, dep.base_threshold)
            .with_smoothing(adapter.smoothing)
            .with_min_samples(adapter.min_samples)
            .with_max_weight(w.timeout.max(w.error).max(w.degraded));

        match &dep.predictor {
            Some(config) => built.with_predictor(Arc::new(LogisticPredictor::from_config(config))),
            None => built,
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    /// Weight given to each new target, in (0, 1].
    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = if smoothing > 0.0 && smoothing <= 1.0 { smoothing } else { 1.0 };
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Weight of the most severe failure kind, used to normalise the
    /// observed failure rate when no predictor is configured.
    pub fn with_max_weight(mut self, max_weight: f64) -> Self {
        self.max_weight = max_weight;
        self
    }

    /// Replace the last-known threshold, e.g. with a breaker's live value.
    pub fn seeded(self, last: f64) -> Self {
        let clamped = self.clamp(last);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = clamped;
        self
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn has_predictor(&self) -> bool {
        self.predictor.is_some()
    }

    pub fn last_threshold(&self) -> f64 {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clamp into [min, max]. NaN maps to min, infinities to the bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.max(self.min).min(self.max)
    }

    /// Compute the next threshold from a telemetry window.
    pub fn update_threshold(&self, window: &TelemetryWindow) -> f64 {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        if window.len() < self.min_samples {
            *last = self.clamp(*last);
            return *last;
        }

        let likelihood = match &self.predictor {
            Some(predictor) => match predictor.predict(&window.features()) {
                Ok(p) if p.is_finite() => Some(p.clamp(0.0, 1.0)),
                Ok(p) => {
                    tracing::warn!(output = p, "Predictor returned a non-finite value, keeping last threshold");
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Predictor failed, keeping last threshold");
                    None
                }
            },
            None => Some(window.observed_likelihood(self.max_weight)),
        };

        let next = match likelihood {
            Some(p) => {
                let target = self.max - p * (self.max - self.min);
                self.clamp(self.smoothing * target + (1.0 - self.smoothing) * *last)
            }
            None => self.clamp(*last),
        };

        *last = next;
        next
    }
}

/// Periodically adapt every breaker's threshold until shutdown.
pub async fn run_adapter_loop(
    fleet: Arc<FleetHandle>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(interval = ?interval, "Threshold adapter starting");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                fleet.load().adapt_thresholds();
            }
            _ = shutdown.recv() => {
                tracing::info!("Threshold adapter received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::predictor::{FnPredictor, PredictError};
    use crate::resilience::classifier::{FailureEvent, FailureKind};
    use std::time::Instant;

    fn window(failures: usize, successes: usize) -> TelemetryWindow {
        let now = Instant::now();
        let mut w = TelemetryWindow::new(Duration::from_secs(60));
        for _ in 0..failures {
            w.record_failure(
                FailureEvent {
                    kind: FailureKind::Error,
                    weight: 2.0,
                    at: now,
                },
                Duration::ZERO,
            );
        }
        for _ in 0..successes {
            w.record_success(now, Duration::ZERO);
        }
        w
    }

    fn constant(value: f64) -> Arc<dyn Predictor> {
        Arc::new(FnPredictor(move |_: &[f64]| -> Result<f64, PredictError> { Ok(value) }))
    }

    #[test]
    fn test_likelihood_maps_into_band() {
        let adapter = ThresholdAdapter::new(2.0, 10.0, 5.0).with_predictor(constant(1.0));
        assert_eq!(adapter.update_threshold(&window(1, 1)), 2.0);

        let adapter = ThresholdAdapter::new(2.0, 10.0, 5.0).with_predictor(constant(0.0));
        assert_eq!(adapter.update_threshold(&window(1, 1)), 10.0);

        let adapter = ThresholdAdapter::new(2.0, 10.0, 5.0).with_predictor(constant(0.5));
        assert_eq!(adapter.update_threshold(&window(1, 1)), 6.0);
    }

    #[test]
    fn test_always_clamped() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300, -1e300] {
            let adapter = ThresholdAdapter::new(2.0, 10.0, 5.0).with_predictor(constant(bad));
            let t = adapter.update_threshold(&window(3, 3));
            assert!((2.0..=10.0).contains(&t), "{} produced {}", bad, t);
        }
    }

    #[test]
    fn test_non_finite_keeps_last_known() {
        let adapter = ThresholdAdapter::new(2.0, 10.0, 7.0).with_predictor(constant(f64::NAN));
        assert_eq!(adapter.update_threshold(&window(2, 2)), 7.0);

        let adapter = ThresholdAdapter::new(2.0, 10.0, 7.0).with_predictor(constant(f64::INFINITY));
        assert_eq!(adapter.update_threshold(&window(2, 2)), 7.0);
    }

    #[test]
    fn test_predictor_error_falls_back() {
        let failing: Arc<dyn Predictor> = Arc::new(FnPredictor(|_: &[f64]| -> Result<f64, PredictError> {
            Err(PredictError::Unavailable("model not loaded".into()))
        }));
        let adapter = ThresholdAdapter::new(2.0, 10.0, 4.0).with_predictor(failing);
        assert_eq!(adapter.update_threshold(&window(5, 0)), 4.0);
        assert_eq!(adapter.last_threshold(), 4.0);
    }

    #[test]
    fn test_observed_rate_without_predictor() {
        let adapter = ThresholdAdapter::new(2.0, 10.0, 5.0).with_max_weight(2.0);
        // All hard errors: likelihood 1, threshold drops to min.
        assert_eq!(adapter.update_threshold(&window(4, 0)), 2.0);
        // All successes: likelihood 0, threshold rises to max.
        assert_eq!(adapter.update_threshold(&window(0, 4)), 10.0);
    }

    #[test]
    fn test_smoothing() {
        let adapter = ThresholdAdapter::new(0.0, 10.0, 10.0)
            .with_predictor(constant(1.0))
            .with_smoothing(0.5);
        assert_eq!(adapter.update_threshold(&window(1, 0)), 5.0);
        assert_eq!(adapter.update_threshold(&window(1, 0)), 2.5);
    }

    #[test]
    fn test_min_samples_holds_value() {
        let adapter = ThresholdAdapter::new(2.0, 10.0, 5.0)
            .with_predictor(constant(1.0))
            .with_min_samples(10);
        assert_eq!(adapter.update_threshold(&window(3, 0)), 5.0);
        assert_eq!(adapter.update_threshold(&window(10, 0)), 2.0);
    }

    #[test]
    fn test_bounds_are_ordered() {
        let adapter = ThresholdAdapter::new(10.0, 2.0, 50.0);
        assert_eq!(adapter.bounds(), (2.0, 10.0));
        assert_eq!(adapter.last_threshold(), 10.0);
        assert_eq!(adapter.clamp(f64::NAN), 2.0);
    }
}
