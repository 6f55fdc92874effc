//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a breaker
//! fleet. All types derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::graph::CascadePolicy;

/// Root configuration for a fleet of circuit breakers.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FleetConfig {
    /// One entry per protected dependency.
    pub dependencies: Vec<DependencyConfig>,

    /// Dependency edges (parent depends on child).
    pub edges: Vec<EdgeConfig>,

    /// Threshold adaptation cadence.
    pub adapter: AdapterConfig,

    /// Status snapshot and reporting settings.
    pub monitor: MonitorConfig,

    /// Central aggregator endpoint settings.
    pub aggregator: AggregatorConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Severity weight per failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailureWeights {
    pub timeout: f64,
    pub error: f64,
    pub degraded: f64,
}

impl Default for FailureWeights {
    fn default() -> Self {
        Self {
            timeout: 1.0,
            error: 2.0,
            degraded: 0.5,
        }
    }
}

/// Per-dependency breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Unique dependency identifier.
    pub name: String,

    /// Weight added to the failure score per failure kind.
    pub failure_weights: FailureWeights,

    /// Static threshold used until the adapter produces one.
    pub base_threshold: f64,

    /// Lower clamp for adapted thresholds.
    pub min_threshold: f64,

    /// Upper clamp for adapted thresholds.
    pub max_threshold: f64,

    /// Time to stay Open before the first probe, in milliseconds.
    pub retry_window_base_ms: u64,

    /// Cap on the retry window after repeated failed probes, in milliseconds.
    pub retry_window_max_backoff_ms: u64,

    /// Admission probability for callers racing an in-flight probe.
    ///
    /// The first probe slot is always granted, so this only has an effect
    /// when `half_open_max_probes` is greater than 1.
    pub half_open_probe_probability: f64,

    /// Maximum concurrent probes in Half-Open.
    pub half_open_max_probes: usize,

    /// Hard time budget for a Half-Open probe in milliseconds. Used when
    /// `call_timeout_ms` is not set.
    pub half_open_probe_timeout_ms: u64,

    /// Multiplier applied to the failure score on each success while Closed.
    pub success_decay: f64,

    /// Half-life of the failure score in milliseconds (absent = no time decay).
    pub decay_half_life_ms: Option<u64>,

    /// Time budget per call in milliseconds (absent = unbounded).
    pub call_timeout_ms: Option<u64>,

    /// Successful calls slower than this count as degraded.
    pub degraded_latency_ms: Option<u64>,

    /// Closed time after which the retry window backoff resets, in milliseconds.
    pub sustained_closed_ms: u64,

    /// Length of the rolling telemetry window, in milliseconds.
    pub telemetry_window_ms: u64,

    /// Optional logistic predictor coefficients for threshold adaptation.
    pub predictor: Option<PredictorConfig>,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            failure_weights: FailureWeights::default(),
            base_threshold: 5.0,
            min_threshold: 2.0,
            max_threshold: 20.0,
            retry_window_base_ms: 10_000,
            retry_window_max_backoff_ms: 300_000,
            half_open_probe_probability: 0.5,
            half_open_max_probes: 1,
            half_open_probe_timeout_ms: 30_000,
            success_decay: 0.5,
            decay_half_life_ms: Some(60_000),
            call_timeout_ms: None,
            degraded_latency_ms: None,
            sustained_closed_ms: 60_000,
            telemetry_window_ms: 60_000,
            predictor: None,
        }
    }
}

impl DependencyConfig {
    /// Default settings under the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn retry_window_base(&self) -> Duration {
        Duration::from_millis(self.retry_window_base_ms)
    }

    pub fn retry_window_max(&self) -> Duration {
        Duration::from_millis(self.retry_window_max_backoff_ms)
    }

    pub fn decay_half_life(&self) -> Option<Duration> {
        self.decay_half_life_ms.map(Duration::from_millis)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn half_open_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.half_open_probe_timeout_ms)
    }

    pub fn degraded_latency(&self) -> Option<Duration> {
        self.degraded_latency_ms.map(Duration::from_millis)
    }

    pub fn sustained_closed(&self) -> Duration {
        Duration::from_millis(self.sustained_closed_ms)
    }

    pub fn telemetry_window(&self) -> Duration {
        Duration::from_millis(self.telemetry_window_ms)
    }
}

/// Coefficients for the logistic failure predictor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PredictorConfig {
    /// One weight per telemetry feature.
    pub weights: Vec<f64>,

    /// Intercept term.
    #[serde(default)]
    pub bias: f64,
}

/// A dependency edge.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EdgeConfig {
    /// The dependent service.
    pub parent: String,

    /// The dependency it calls.
    pub child: String,

    /// What happens to the parent when the child opens.
    #[serde(default)]
    pub policy: CascadePolicy,
}

/// Threshold adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Enable periodic threshold adaptation.
    pub enabled: bool,

    /// Evaluation interval in milliseconds.
    pub interval_ms: u64,

    /// EWMA factor applied to new targets (1.0 = no smoothing).
    pub smoothing: f64,

    /// Observations needed before the window is trusted.
    pub min_samples: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            smoothing: 0.3,
            min_samples: 10,
        }
    }
}

/// Status monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Enable periodic snapshots.
    pub enabled: bool,

    /// Snapshot interval in milliseconds.
    pub interval_ms: u64,

    /// Human-readable name for this process in aggregated views.
    pub instance_name: Option<String>,

    /// Log every snapshot through tracing.
    pub log_snapshots: bool,

    /// Remote aggregator report URL (e.g. "http://10.0.0.5:7070/v1/reports").
    pub push_url: Option<String>,

    /// Bearer token sent with pushed reports.
    pub push_api_key: Option<String>,

    /// Timeout for a single push in milliseconds.
    pub push_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1_000,
            instance_name: None,
            log_snapshots: false,
            push_url: None,
            push_api_key: None,
            push_timeout_ms: 2_000,
        }
    }
}

/// Aggregator server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Serve the aggregator endpoints from this process.
    pub enabled: bool,

    /// Bind address (e.g., "127.0.0.1:7070").
    pub bind_address: String,

    /// Instances silent for longer than this are dropped, in seconds.
    pub stale_after_secs: u64,

    /// Bearer token required on report ingestion (absent = open).
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:7070".to_string(),
            stale_after_secs: 30,
            api_key: None,
            request_timeout_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
