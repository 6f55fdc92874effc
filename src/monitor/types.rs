//! Snapshot and report types exchanged between processes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::resilience::circuit_breaker::{BreakerStatus, CircuitState};

/// Immutable view of every breaker in one process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Increases by one per snapshot taken in this process.
    pub sequence: u64,
    pub taken_at_unix_ms: u64,
    pub breakers: BTreeMap<String, BreakerStatus>,
}

impl StatusSnapshot {
    pub fn get(&self, dependency: &str) -> Option<&BreakerStatus> {
        self.breakers.get(dependency)
    }

    /// Number of breakers currently in `state`.
    pub fn count_in(&self, state: CircuitState) -> usize {
        self.breakers.values().filter(|b| b.state == state).count()
    }
}

/// What one process pushes to the aggregator each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub instance_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    pub sequence: u64,
    pub snapshot: StatusSnapshot,
}

/// Latest known state of one reporting instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub instance_id: Uuid,
    pub instance_name: Option<String>,
    pub sequence: u64,
    pub last_seen_unix_ms: u64,
    pub breakers: usize,
    pub open: usize,
}

/// One dependency as seen across all instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyView {
    /// Worst state reported by any instance.
    pub state: CircuitState,
    pub instances: usize,
    pub open_instances: usize,
    pub max_failure_score: f64,
}

/// Eventually consistent fleet-wide view. Not for admission decisions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalView {
    pub generated_at_unix_ms: u64,
    pub instances: usize,
    pub dependencies: BTreeMap<String, DependencyView>,
}
