//! Graph value types and errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a parent does when one of its dependencies opens.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Open the parent immediately.
    #[default]
    FailFast,
    /// Add `weight` to the parent's failure score.
    SoftPressure { weight: f64 },
}

impl CascadePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadePolicy::FailFast => "fail_fast",
            CascadePolicy::SoftPressure { .. } => "soft_pressure",
        }
    }
}

/// `parent` calls `child`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub parent: String,
    pub child: String,
    pub policy: CascadePolicy,
}

/// Graph construction errors. All of them leave the builder unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("edge '{parent}' -> '{child}' would create a cycle")]
    Cycle { parent: String, child: String },

    #[error("unknown dependency '{0}'")]
    UnknownDependency(String),

    #[error("edge '{parent}' -> '{child}' already exists")]
    DuplicateEdge { parent: String, child: String },

    #[error("dependency '{0}' is already registered")]
    DuplicateDependency(String),
}
