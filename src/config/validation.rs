//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (edges reference declared dependencies)
//! - Validate value ranges (thresholds ordered, probabilities in [0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Cycle detection is left to the graph builder, which owns that invariant

use std::collections::HashSet;
use std::fmt;

use crate::adaptive::FEATURE_COUNT;
use crate::config::schema::{DependencyConfig, FleetConfig};
use crate::graph::CascadePolicy;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted path to the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &FleetConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for (i, dep) in config.dependencies.iter().enumerate() {
        let field = format!("dependencies[{}]", i);
        if dep.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !names.insert(dep.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate dependency '{}'", dep.name),
            ));
        }
        validate_dependency(&field, dep, &mut errors);
    }

    for (i, edge) in config.edges.iter().enumerate() {
        let field = format!("edges[{}]", i);
        for (end, name) in [("parent", &edge.parent), ("child", &edge.child)] {
            if !names.contains(name.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.{}", field, end),
                    format!("unknown dependency '{}'", name),
                ));
            }
        }
        if let CascadePolicy::SoftPressure { weight } = edge.policy {
            if !(weight.is_finite() && weight > 0.0) {
                errors.push(ValidationError::new(
                    format!("{}.policy.weight", field),
                    "must be a positive number",
                ));
            }
        }
    }

    if config.adapter.interval_ms == 0 {
        errors.push(ValidationError::new("adapter.interval_ms", "must be greater than 0"));
    }
    if !(config.adapter.smoothing > 0.0 && config.adapter.smoothing <= 1.0) {
        errors.push(ValidationError::new("adapter.smoothing", "must be in (0, 1]"));
    }
    if config.monitor.interval_ms == 0 {
        errors.push(ValidationError::new("monitor.interval_ms", "must be greater than 0"));
    }
    if let Some(push_url) = &config.monitor.push_url {
        if let Err(e) = url::Url::parse(push_url) {
            errors.push(ValidationError::new("monitor.push_url", format!("invalid URL: {}", e)));
        }
    }
    if config.aggregator.enabled && config.aggregator.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "aggregator.bind_address",
            format!("invalid socket address '{}'", config.aggregator.bind_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_dependency(field: &str, dep: &DependencyConfig, errors: &mut Vec<ValidationError>) {
    let w = &dep.failure_weights;
    for (kind, weight) in [("timeout", w.timeout), ("error", w.error), ("degraded", w.degraded)] {
        if !(weight.is_finite() && weight >= 0.0) {
            errors.push(ValidationError::new(
                format!("{}.failure_weights.{}", field, kind),
                "must be a non-negative number",
            ));
        }
    }

    let ordered = dep.min_threshold > 0.0
        && dep.min_threshold <= dep.base_threshold
        && dep.base_threshold <= dep.max_threshold
        && dep.max_threshold.is_finite();
    if !ordered {
        errors.push(ValidationError::new(
            format!("{}.base_threshold", field),
            format!(
                "thresholds must satisfy 0 < min ({}) <= base ({}) <= max ({})",
                dep.min_threshold, dep.base_threshold, dep.max_threshold
            ),
        ));
    }

    if dep.retry_window_base_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.retry_window_base_ms", field),
            "must be greater than 0",
        ));
    }
    if dep.retry_window_max_backoff_ms < dep.retry_window_base_ms {
        errors.push(ValidationError::new(
            format!("{}.retry_window_max_backoff_ms", field),
            "must not be smaller than retry_window_base_ms",
        ));
    }
    if !(0.0..=1.0).contains(&dep.half_open_probe_probability) {
        errors.push(ValidationError::new(
            format!("{}.half_open_probe_probability", field),
            "must be in [0, 1]",
        ));
    }
    if dep.half_open_max_probes == 0 {
        errors.push(ValidationError::new(
            format!("{}.half_open_max_probes", field),
            "must be at least 1",
        ));
    }
    if dep.half_open_probe_timeout_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.half_open_probe_timeout_ms", field),
            "must be greater than 0",
        ));
    }
    if !(0.0..=1.0).contains(&dep.success_decay) {
        errors.push(ValidationError::new(
            format!("{}.success_decay", field),
            "must be in [0, 1]",
        ));
    }
    if dep.decay_half_life_ms == Some(0) {
        errors.push(ValidationError::new(
            format!("{}.decay_half_life_ms", field),
            "must be greater than 0 when set",
        ));
    }
    if dep.call_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            format!("{}.call_timeout_ms", field),
            "must be greater than 0 when set",
        ));
    }
    if dep.telemetry_window_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.telemetry_window_ms", field),
            "must be greater than 0",
        ));
    }
    if let Some(predictor) = &dep.predictor {
        if predictor.weights.iter().chain([&predictor.bias]).any(|w| !w.is_finite()) {
            errors.push(ValidationError::new(
                format!("{}.predictor", field),
                "coefficients must be finite",
            ));
        }
        if predictor.weights.len() > FEATURE_COUNT {
            errors.push(ValidationError::new(
                format!("{}.predictor.weights", field),
                format!(
                    "at most {} weights allowed, one per telemetry feature (got {})",
                    FEATURE_COUNT,
                    predictor.weights.len()
                ),
            ));
        }
    }
}
