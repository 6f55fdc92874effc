//! Central aggregation of process reports.
//!
//! # Responsibilities
//! - Keep the latest report per reporting instance
//! - Drop out-of-order and duplicate reports
//! - Evict instances that stopped reporting
//! - Merge everything into a per-dependency global view
//!
//! # Design Decisions
//! - Concurrent map (`DashMap`); ingestion never blocks readers for long
//! - The merged view is eventually consistent by construction; only a
//!   breaker's own state is authoritative for admission

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::monitor::types::{DependencyView, GlobalView, InstanceSummary, ProcessReport};
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::clock::unix_millis;

/// Result of offering a report to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    /// Sequence not newer than the one already held.
    OutOfOrder,
}

#[derive(Debug, Clone)]
struct InstanceEntry {
    report: ProcessReport,
    received_at: Instant,
    received_at_wall: SystemTime,
}

/// Latest report per instance.
#[derive(Debug)]
pub struct Aggregator {
    instances: DashMap<Uuid, InstanceEntry>,
    stale_after: Duration,
}

impl Aggregator {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            instances: DashMap::new(),
            stale_after,
        }
    }

    pub fn ingest(&self, report: ProcessReport) -> IngestOutcome {
        self.ingest_at(report, Instant::now(), SystemTime::now())
    }

    /// Ingest with an explicit receive time.
    pub fn ingest_at(&self, report: ProcessReport, now: Instant, wall: SystemTime) -> IngestOutcome {
        let entry = InstanceEntry {
            report,
            received_at: now,
            received_at_wall: wall,
        };

        match self.instances.entry(entry.report.instance_id) {
            Entry::Occupied(mut existing) => {
                if entry.report.sequence <= existing.get().report.sequence {
                    tracing::debug!(
                        instance_id = %entry.report.instance_id,
                        sequence = entry.report.sequence,
                        held = existing.get().report.sequence,
                        "Dropping out-of-order report"
                    );
                    return IngestOutcome::OutOfOrder;
                }
                existing.insert(entry);
            }
            Entry::Vacant(slot) => {
                tracing::info!(
                    instance_id = %entry.report.instance_id,
                    instance_name = ?entry.report.instance_name,
                    "New instance reporting"
                );
                slot.insert(entry);
            }
        }
        IngestOutcome::Accepted
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn report(&self, instance_id: &Uuid) -> Option<ProcessReport> {
        self.instances.get(instance_id).map(|e| e.report.clone())
    }

    pub fn instances(&self) -> Vec<InstanceSummary> {
        let mut summaries: Vec<InstanceSummary> = self
            .instances
            .iter()
            .map(|e| {
                let snapshot = &e.report.snapshot;
                InstanceSummary {
                    instance_id: e.report.instance_id,
                    instance_name: e.report.instance_name.clone(),
                    sequence: e.report.sequence,
                    last_seen_unix_ms: unix_millis(e.received_at_wall),
                    breakers: snapshot.breakers.len(),
                    open: snapshot.count_in(CircuitState::Open),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.instance_name.cmp(&b.instance_name).then(a.instance_id.cmp(&b.instance_id)));
        summaries
    }

    /// Drop instances silent for longer than `stale_after`.
    pub fn evict_stale(&self) -> usize {
        self.evict_stale_at(Instant::now())
    }

    pub fn evict_stale_at(&self, now: Instant) -> usize {
        let before = self.instances.len();
        self.instances.retain(|id, entry| {
            let fresh = now.saturating_duration_since(entry.received_at) <= self.stale_after;
            if !fresh {
                tracing::warn!(instance_id = %id, "Evicting stale instance");
            }
            fresh
        });
        before.saturating_sub(self.instances.len())
    }

    /// Worst state per dependency across all instances.
    pub fn global_view(&self) -> GlobalView {
        let mut view = GlobalView {
            generated_at_unix_ms: unix_millis(SystemTime::now()),
            instances: self.instances.len(),
            ..GlobalView::default()
        };

        for entry in self.instances.iter() {
            for (name, status) in &entry.report.snapshot.breakers {
                let dep = view
                    .dependencies
                    .entry(name.clone())
                    .or_insert_with(|| DependencyView {
                        state: CircuitState::Closed,
                        instances: 0,
                        open_instances: 0,
                        max_failure_score: 0.0,
                    });
                dep.instances += 1;
                if status.state == CircuitState::Open {
                    dep.open_instances += 1;
                }
                if status.state.severity() > dep.state.severity() {
                    dep.state = status.state;
                }
                dep.max_failure_score = dep.max_failure_score.max(status.failure_score);
            }
        }
        view
    }

    /// Drain an in-process report channel into the aggregator.
    pub async fn consume(self: Arc<Self>, mut reports: mpsc::Receiver<ProcessReport>) {
        while let Some(report) = reports.recv().await {
            self.ingest(report);
        }
        tracing::debug!("Report channel closed, aggregator consumer exiting");
    }

    /// Periodically evict stale instances until shutdown.
    pub async fn run_eviction(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evict_stale();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Aggregator eviction received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::StatusSnapshot;
    use crate::resilience::circuit_breaker::{BreakerCounters, BreakerStatus};

    fn status(state: CircuitState, score: f64) -> BreakerStatus {
        BreakerStatus {
            state,
            failure_score: score,
            threshold: 5.0,
            last_transition_unix_ms: 0,
            retry_window_ms: 10_000,
            open_episode: None,
            in_flight_probes: 0,
            last_failure: None,
            counters: BreakerCounters::default(),
        }
    }

    fn report(id: Uuid, sequence: u64, breakers: &[(&str, CircuitState, f64)]) -> ProcessReport {
        ProcessReport {
            instance_id: id,
            instance_name: None,
            sequence,
            snapshot: StatusSnapshot {
                sequence,
                taken_at_unix_ms: 0,
                breakers: breakers
                    .iter()
                    .map(|(n, s, f)| (n.to_string(), status(*s, *f)))
                    .collect(),
            },
        }
    }

    #[test]
    fn test_out_of_order_dropped() {
        let agg = Aggregator::new(Duration::from_secs(30));
        let id = Uuid::new_v4();

        assert_eq!(agg.ingest(report(id, 2, &[("db", CircuitState::Open, 4.0)])), IngestOutcome::Accepted);
        assert_eq!(agg.ingest(report(id, 1, &[("db", CircuitState::Closed, 0.0)])), IngestOutcome::OutOfOrder);
        assert_eq!(agg.ingest(report(id, 2, &[("db", CircuitState::Closed, 0.0)])), IngestOutcome::OutOfOrder);

        let held = agg.report(&id).unwrap();
        assert_eq!(held.sequence, 2);
        assert_eq!(held.snapshot.get("db").unwrap().state, CircuitState::Open);
    }

    #[test]
    fn test_global_view_takes_worst_state() {
        let agg = Aggregator::new(Duration::from_secs(30));
        agg.ingest(report(
            Uuid::new_v4(),
            1,
            &[("db", CircuitState::Closed, 1.0), ("cache", CircuitState::HalfOpen, 0.0)],
        ));
        agg.ingest(report(Uuid::new_v4(), 1, &[("db", CircuitState::Open, 6.0)]));

        let view = agg.global_view();
        assert_eq!(view.instances, 2);

        let db = &view.dependencies["db"];
        assert_eq!(db.state, CircuitState::Open);
        assert_eq!(db.instances, 2);
        assert_eq!(db.open_instances, 1);
        assert_eq!(db.max_failure_score, 6.0);

        assert_eq!(view.dependencies["cache"].state, CircuitState::HalfOpen);
    }

    #[test]
    fn test_stale_instances_evicted() {
        let agg = Aggregator::new(Duration::from_secs(30));
        let start = Instant::now();
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        agg.ingest_at(report(old, 1, &[]), start, SystemTime::now());
        agg.ingest_at(report(fresh, 1, &[]), start + Duration::from_secs(20), SystemTime::now());

        assert_eq!(agg.evict_stale_at(start + Duration::from_secs(31)), 1);
        assert!(agg.report(&old).is_none());
        assert!(agg.report(&fresh).is_some());
    }

    #[tokio::test]
    async fn test_consume_channel() {
        let agg = Arc::new(Aggregator::new(Duration::from_secs(30)));
        let (tx, rx) = mpsc::channel(4);
        let consumer = tokio::spawn(agg.clone().consume(rx));

        tx.send(report(Uuid::new_v4(), 1, &[])).await.unwrap();
        drop(tx);
        consumer.await.unwrap();
        assert_eq!(agg.instance_count(), 1);
    }
}
