//! Graph construction.
//!
//! Edges are validated one at a time; the graph is frozen by `build` and
//! never mutated afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};

use crate::graph::dependency::DependencyGraph;
use crate::graph::types::{CascadePolicy, DependencyEdge, GraphError};
use crate::resilience::circuit_breaker::{CircuitBreaker, TransitionObserver};

/// Collects breakers and acyclic edges.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    breakers: BTreeMap<String, Arc<CircuitBreaker>>,
    edges: Vec<DependencyEdge>,
    /// parent -> children
    children: HashMap<String, Vec<String>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker under its own name.
    pub fn add_breaker(&mut self, breaker: Arc<CircuitBreaker>) -> Result<(), GraphError> {
        let name = breaker.name().to_string();
        if self.breakers.contains_key(&name) {
            return Err(GraphError::DuplicateDependency(name));
        }
        self.breakers.insert(name, breaker);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.breakers.contains_key(name)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add `parent -> child`. Fails without modifying the builder if either
    /// end is unknown, the edge exists, or it would close a cycle.
    pub fn add_edge(&mut self, parent: &str, child: &str, policy: CascadePolicy) -> Result<(), GraphError> {
        for name in [parent, child] {
            if !self.breakers.contains_key(name) {
                return Err(GraphError::UnknownDependency(name.to_string()));
            }
        }

        if parent == child || self.reaches(child, parent) {
            return Err(GraphError::Cycle {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        if self.edges.iter().any(|e| e.parent == parent && e.child == child) {
            return Err(GraphError::DuplicateEdge {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
        self.edges.push(DependencyEdge {
            parent: parent.to_string(),
            child: child.to_string(),
            policy,
        });
        Ok(())
    }

    /// Depth-first search along child edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();

        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(children) = self.children.get(node) {
                stack.extend(children.iter().map(String::as_str));
            }
        }
        false
    }

    /// Freeze the graph and subscribe it to every breaker.
    pub fn build(self) -> Arc<DependencyGraph> {
        let graph = Arc::new(DependencyGraph::new(self.breakers, self.edges));
        let observer: Weak<dyn TransitionObserver> = Arc::downgrade(&graph) as Weak<dyn TransitionObserver>;
        for breaker in graph.breakers() {
            breaker.subscribe(observer.clone());
        }

        tracing::debug!(
            dependencies = graph.len(),
            edges = graph.edges().len(),
            "Dependency graph built"
        );
        graph
    }
}
