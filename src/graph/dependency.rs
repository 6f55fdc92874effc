//! Frozen dependency graph and cascade propagation.
//!
//! # Responsibilities
//! - Answer structural queries (dependents, dependencies, order)
//! - Propagate a child's Open transition to its dependents
//!
//! # Design Decisions
//! - Breadth-first walk with a visited set; every node is touched at most
//!   once per notification, including in diamond-shaped graphs
//! - The walk continues upward only through parents that end up Open
//! - Transitions caused by a cascade do not start another walk; the walk
//!   that caused them already covers their dependents
//! - Breakers are driven only through their public API

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::graph::types::{CascadePolicy, DependencyEdge};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState, TransitionEvent, TransitionObserver};

/// Outcome of one cascade walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Dependents opened by the walk.
    pub opened: Vec<String>,
    /// Dependents that received soft pressure but stayed Closed.
    pub pressured: Vec<String>,
}

/// Immutable graph of breakers.
#[derive(Debug)]
pub struct DependencyGraph {
    breakers: BTreeMap<String, Arc<CircuitBreaker>>,
    edges: Vec<DependencyEdge>,
    /// child -> (parent, policy)
    dependents: HashMap<String, Vec<(String, CascadePolicy)>>,
    /// parent -> children
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub(crate) fn new(breakers: BTreeMap<String, Arc<CircuitBreaker>>, edges: Vec<DependencyEdge>) -> Self {
        let mut dependents: HashMap<String, Vec<(String, CascadePolicy)>> = HashMap::new();
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();

        for edge in &edges {
            dependents
                .entry(edge.child.clone())
                .or_default()
                .push((edge.parent.clone(), edge.policy));
            dependencies
                .entry(edge.parent.clone())
                .or_default()
                .push(edge.child.clone());
        }

        Self {
            breakers,
            edges,
            dependents,
            dependencies,
        }
    }

    pub fn breaker(&self, name: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(name)
    }

    /// All breakers, ordered by name.
    pub fn breakers(&self) -> impl Iterator<Item = &Arc<CircuitBreaker>> {
        self.breakers.values()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Direct dependents (callers) of `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.dependents
            .get(name)
            .map(|parents| parents.iter().map(|(p, _)| p.as_str()).collect())
            .unwrap_or_default()
    }

    /// Direct dependencies of `name`.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.dependencies
            .get(name)
            .map(|children| children.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Names ordered so every dependency precedes its dependents.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut remaining: HashMap<&str, usize> = self
            .breakers
            .keys()
            .map(|name| (name.as_str(), self.dependencies_of(name).len()))
            .collect();

        let mut ready: VecDeque<&str> = self
            .breakers
            .keys()
            .map(String::as_str)
            .filter(|name| remaining.get(name) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(self.breakers.len());
        while let Some(name) = ready.pop_front() {
            order.push(name);
            for parent in self.dependents_of(name) {
                if let Some(count) = remaining.get_mut(parent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(parent);
                    }
                }
            }
        }
        order
    }

    /// Propagate `origin`'s new state to its dependents.
    ///
    /// Only an Open transition cascades.
    pub fn notify(&self, origin: &str, new_state: CircuitState) -> CascadeReport {
        let mut report = CascadeReport::default();
        if new_state != CircuitState::Open {
            return report;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(origin);
        queue.push_back(origin);

        while let Some(name) = queue.pop_front() {
            let Some(parents) = self.dependents.get(name) else {
                continue;
            };

            for (parent, policy) in parents {
                if !visited.insert(parent.as_str()) {
                    continue;
                }
                let Some(breaker) = self.breakers.get(parent) else {
                    continue;
                };

                metrics::record_cascade(origin, policy.as_str());
                let opened = match policy {
                    CascadePolicy::FailFast => breaker.request_open(origin),
                    CascadePolicy::SoftPressure { weight } => {
                        let opened = breaker.apply_pressure(*weight, origin);
                        if !opened {
                            report.pressured.push(parent.clone());
                        }
                        opened
                    }
                };
                if opened {
                    report.opened.push(parent.clone());
                }

                if breaker.state() == CircuitState::Open {
                    queue.push_back(parent.as_str());
                }
            }
        }

        if !report.opened.is_empty() || !report.pressured.is_empty() {
            tracing::warn!(
                origin = %origin,
                opened = ?report.opened,
                pressured = ?report.pressured,
                "Failure cascaded to dependents"
            );
        }
        report
    }
}

impl TransitionObserver for DependencyGraph {
    fn on_transition(&self, event: &TransitionEvent) {
        if event.cause.is_cascade() {
            return;
        }
        self.notify(&event.dependency, event.to);
    }
}
