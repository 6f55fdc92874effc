//! Fleet wiring.
//!
//! # Responsibilities
//! - Build one breaker and one threshold adapter per configured dependency
//! - Freeze the dependency graph over those breakers
//! - Swap in a rebuilt fleet on reload, reusing breakers by name
//!
//! # Design Decisions
//! - A reload never resets a surviving breaker: state, score and counters
//!   carry over, only settings change
//! - A surviving breaker keeps its adapted threshold unless its configured
//!   `base_threshold` changed or adaptation is off
//! - Edges are validated before any surviving breaker is reconfigured, so
//!   a rejected reload leaves the running fleet untouched
//! - The transition feed outlives every fleet generation

use arc_swap::{ArcSwap, Guard};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use crate::adaptive::threshold::ThresholdAdapter;
use crate::config::{DependencyConfig, FleetConfig};
use crate::graph::{DependencyGraph, GraphBuilder, GraphError};
use crate::monitor::status::TransitionFeed;
use crate::resilience::circuit_breaker::{CircuitBreaker, TransitionEvent, TransitionObserver};
use crate::resilience::clock::{Clock, SystemClock};

const TRANSITION_FEED_CAPACITY: usize = 256;

/// One generation of breakers, adapters and graph.
pub struct Fleet {
    graph: Arc<DependencyGraph>,
    adapters: HashMap<String, ThresholdAdapter>,
    bases: HashMap<String, f64>,
    clock: Arc<dyn Clock>,
    adaptive: bool,
}

impl Fleet {
    fn build(
        config: &FleetConfig,
        clock: &Arc<dyn Clock>,
        feed: &Arc<TransitionFeed>,
        previous: Option<&Fleet>,
    ) -> Result<Self, GraphError> {
        let feed_observer: Weak<dyn TransitionObserver> = Arc::downgrade(feed) as Weak<dyn TransitionObserver>;
        let mut builder = GraphBuilder::new();
        let mut reused: Vec<(Arc<CircuitBreaker>, &DependencyConfig)> = Vec::new();
        let mut created: Vec<Arc<CircuitBreaker>> = Vec::new();

        for dep in &config.dependencies {
            let breaker = match previous.and_then(|p| p.breaker(&dep.name)) {
                Some(existing) => {
                    reused.push((existing.clone(), dep));
                    existing.clone()
                }
                None => {
                    let breaker = Arc::new(CircuitBreaker::with_clock(dep, clock.clone()));
                    created.push(breaker.clone());
                    breaker
                }
            };
            builder.add_breaker(breaker)?;
        }

        for edge in &config.edges {
            builder.add_edge(&edge.parent, &edge.child, edge.policy)?;
        }

        for (breaker, dep) in &reused {
            breaker.reconfigure(dep);
            let base_changed = previous
                .and_then(|p| p.bases.get(&dep.name))
                .map_or(true, |base| *base != dep.base_threshold);
            if !config.adapter.enabled || base_changed {
                let threshold = breaker.set_threshold(dep.base_threshold);
                if base_changed {
                    tracing::info!(dependency = %dep.name, threshold, "Base threshold changed, adaptation restarts from it");
                }
            }
        }
        for breaker in &created {
            breaker.subscribe(feed_observer.clone());
        }

        let graph = builder.build();
        let adapters = config
            .dependencies
            .iter()
            .filter_map(|dep| {
                let breaker = graph.breaker(&dep.name)?;
                let adapter = ThresholdAdapter::from_config(dep, &config.adapter).seeded(breaker.threshold());
                Some((dep.name.clone(), adapter))
            })
            .collect();

        tracing::info!(
            dependencies = graph.len(),
            edges = graph.edges().len(),
            reused = reused.len(),
            created = created.len(),
            "Fleet built"
        );

        let bases = config
            .dependencies
            .iter()
            .map(|dep| (dep.name.clone(), dep.base_threshold))
            .collect();

        Ok(Self {
            graph,
            adapters,
            bases,
            clock: clock.clone(),
            adaptive: config.adapter.enabled,
        })
    }

    pub fn breaker(&self, name: &str) -> Option<&Arc<CircuitBreaker>> {
        self.graph.breaker(name)
    }

    pub fn breakers(&self) -> impl Iterator<Item = &Arc<CircuitBreaker>> {
        self.graph.breakers()
    }

    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    pub fn adapter(&self, name: &str) -> Option<&ThresholdAdapter> {
        self.adapters.get(name)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run every adapter once and install the results. Returns how many
    /// thresholds changed.
    pub fn adapt_thresholds(&self) -> usize {
        if !self.adaptive {
            return 0;
        }

        let mut changed = 0;
        for breaker in self.graph.breakers() {
            let Some(adapter) = self.adapters.get(breaker.name()) else {
                continue;
            };
            let previous = breaker.threshold();
            let next = breaker.set_threshold(adapter.update_threshold(&breaker.telemetry()));

            if (next - previous).abs() > f64::EPSILON {
                changed += 1;
                tracing::debug!(
                    dependency = %breaker.name(),
                    previous,
                    next,
                    "Threshold adapted"
                );
            }
        }
        changed
    }
}

/// Atomically swappable handle to the current fleet.
pub struct FleetHandle {
    current: ArcSwap<Fleet>,
    feed: Arc<TransitionFeed>,
    clock: Arc<dyn Clock>,
}

impl FleetHandle {
    pub fn from_config(config: &FleetConfig) -> Result<Self, GraphError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &FleetConfig, clock: Arc<dyn Clock>) -> Result<Self, GraphError> {
        let feed = Arc::new(TransitionFeed::new(TRANSITION_FEED_CAPACITY));
        let fleet = Fleet::build(config, &clock, &feed, None)?;
        Ok(Self {
            current: ArcSwap::from_pointee(fleet),
            feed,
            clock,
        })
    }

    /// Current fleet, for short-lived access.
    pub fn load(&self) -> Guard<Arc<Fleet>> {
        self.current.load()
    }

    /// Current fleet, for holding across awaits.
    pub fn load_full(&self) -> Arc<Fleet> {
        self.current.load_full()
    }

    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.current.load().breaker(name).cloned()
    }

    /// Rebuild from `config` and swap it in. On error the running fleet
    /// is kept.
    ///
    /// Surviving breakers keep their state and adapted threshold. A changed
    /// `base_threshold` replaces the live threshold and reseeds the adapter.
    pub fn reload(&self, config: &FleetConfig) -> Result<(), GraphError> {
        let current = self.current.load_full();
        let next = Fleet::build(config, &self.clock, &self.feed, Some(&current))?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<TransitionEvent> {
        self.feed.subscribe()
    }
}
