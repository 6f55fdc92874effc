//! Failure likelihood predictors.
//!
//! Only the inference side lives here. Training happens elsewhere; a
//! predictor is handed its coefficients and answers `predict`.

use std::fmt;
use thiserror::Error;

use crate::config::PredictorConfig;

/// Errors a predictor may report instead of a likelihood.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    /// The model cannot answer right now (not loaded, remote down).
    #[error("predictor unavailable: {0}")]
    Unavailable(String),

    /// Fewer features than the model expects.
    #[error("expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },
}

/// Estimates the probability that the dependency is failing.
///
/// Implementations are treated as stateless by the breaker and may be
/// called from the adapter task at any time.
pub trait Predictor: Send + Sync + fmt::Debug {
    /// Failure likelihood for the given features, expected in [0, 1].
    fn predict(&self, features: &[f64]) -> Result<f64, PredictError>;
}

/// Logistic regression inference: `sigmoid(bias + w · x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticPredictor {
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticPredictor {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn from_config(config: &PredictorConfig) -> Self {
        Self::new(config.weights.clone(), config.bias)
    }
}

impl Predictor for LogisticPredictor {
    fn predict(&self, features: &[f64]) -> Result<f64, PredictError> {
        if features.len() < self.weights.len() {
            return Err(PredictError::FeatureMismatch {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }
        let z = self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

/// Adapts a closure into a predictor.
pub struct FnPredictor<F>(pub F);

impl<F> fmt::Debug for FnPredictor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPredictor")
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&[f64]) -> Result<f64, PredictError> + Send + Sync,
{
    fn predict(&self, features: &[f64]) -> Result<f64, PredictError> {
        (self.0)(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logistic_midpoint() {
        let p = LogisticPredictor::new(vec![1.0, 1.0], 0.0);
        assert_eq!(p.predict(&[0.0, 0.0]).unwrap(), 0.5);

        let high = p.predict(&[5.0, 5.0]).unwrap();
        assert!(high > 0.99);

        let low = LogisticPredictor::new(vec![1.0], -10.0).predict(&[0.0]).unwrap();
        assert!(low < 0.001);
    }

    #[test]
    fn test_feature_mismatch() {
        let p = LogisticPredictor::new(vec![1.0, 2.0, 3.0], 0.0);
        assert_eq!(
            p.predict(&[1.0]),
            Err(PredictError::FeatureMismatch {
                expected: 3,
                actual: 1
            })
        );
    }

    #[test]
    fn test_fn_predictor() {
        let p = FnPredictor(|features: &[f64]| -> Result<f64, PredictError> { Ok(features[0] * 0.5) });
        assert_eq!(p.predict(&[0.8]).unwrap(), 0.4);
    }
}
