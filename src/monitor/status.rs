//! Per-process status monitor.
//!
//! # Responsibilities
//! - Produce immutable status snapshots of every breaker in the fleet
//! - Push one report per tick to each telemetry sink
//! - Relay transition events to in-process subscribers
//!
//! # Design Decisions
//! - Each breaker is read under its own lock, one at a time; a snapshot
//!   never holds more than one breaker lock
//! - The latest snapshot is published through `ArcSwap`, so readers never
//!   see a half-built map
//! - Sink failures are logged and skipped; the loop keeps its cadence

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::fleet::FleetHandle;
use crate::monitor::sink::TelemetrySink;
use crate::monitor::types::{ProcessReport, StatusSnapshot};
use crate::resilience::circuit_breaker::{TransitionEvent, TransitionObserver};
use crate::resilience::clock::unix_millis;

/// Fan-out of breaker transitions to async subscribers.
#[derive(Debug)]
pub struct TransitionFeed {
    tx: broadcast::Sender<TransitionEvent>,
}

impl TransitionFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.tx.subscribe()
    }
}

impl TransitionObserver for TransitionFeed {
    fn on_transition(&self, event: &TransitionEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event.clone());
    }
}

/// Builds snapshots and pushes reports.
pub struct StatusMonitor {
    fleet: Arc<FleetHandle>,
    instance_id: Uuid,
    instance_name: Option<String>,
    sequence: AtomicU64,
    latest: ArcSwap<StatusSnapshot>,
}

impl StatusMonitor {
    pub fn new(fleet: Arc<FleetHandle>, config: &MonitorConfig) -> Self {
        Self {
            fleet,
            instance_id: Uuid::new_v4(),
            instance_name: config.instance_name.clone(),
            sequence: AtomicU64::new(0),
            latest: ArcSwap::from_pointee(StatusSnapshot::default()),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Take a fresh snapshot and publish it as the latest.
    pub fn snapshot(&self) -> Arc<StatusSnapshot> {
        let fleet = self.fleet.load();
        let breakers = fleet
            .breakers()
            .map(|b| (b.name().to_string(), b.status()))
            .collect();

        let snapshot = Arc::new(StatusSnapshot {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            taken_at_unix_ms: unix_millis(fleet.clock().wall()),
            breakers,
        });
        self.publish(&snapshot);
        snapshot
    }

    /// Store as latest unless a newer snapshot got there first.
    fn publish(&self, snapshot: &Arc<StatusSnapshot>) {
        self.latest.rcu(|current| {
            if current.sequence > snapshot.sequence {
                Arc::clone(current)
            } else {
                Arc::clone(snapshot)
            }
        });
    }

    /// Most recent snapshot without touching any breaker.
    pub fn latest(&self) -> Arc<StatusSnapshot> {
        self.latest.load_full()
    }

    pub fn report(&self, snapshot: &StatusSnapshot) -> ProcessReport {
        ProcessReport {
            instance_id: self.instance_id,
            instance_name: self.instance_name.clone(),
            sequence: snapshot.sequence,
            snapshot: snapshot.clone(),
        }
    }

    /// Snapshot once and push to every sink.
    pub async fn tick(&self, sinks: &[Box<dyn TelemetrySink>]) {
        let snapshot = self.snapshot();
        let report = self.report(&snapshot);

        for sink in sinks {
            if let Err(e) = sink.publish(&report).await {
                tracing::warn!(sink = sink.name(), sequence = report.sequence, error = %e, "Failed to publish status report");
            }
        }
    }

    /// Tick until shutdown, logging transitions as they happen.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        sinks: Vec<Box<dyn TelemetrySink>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(
            instance_id = %self.instance_id,
            interval = ?interval,
            sinks = sinks.len(),
            "Status monitor starting"
        );

        let mut transitions = self.fleet.subscribe_transitions();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(&sinks).await;
                }
                event = transitions.recv() => match event {
                    Ok(event) => tracing::debug!(
                        dependency = %event.dependency,
                        from = %event.from,
                        to = %event.to,
                        "Transition observed"
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Status monitor lagged behind transition feed");
                    }
                    Err(RecvError::Closed) => {
                        transitions = self.fleet.subscribe_transitions();
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Status monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DependencyConfig, FleetConfig};
    use crate::monitor::sink::ChannelSink;
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::resilience::clock::{Clock, ManualClock};

    fn fleet() -> Arc<FleetHandle> {
        let config = FleetConfig {
            dependencies: vec![DependencyConfig::named("db"), DependencyConfig::named("cache")],
            ..FleetConfig::default()
        };
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        Arc::new(FleetHandle::with_clock(&config, clock).unwrap())
    }

    #[test]
    fn test_snapshots_are_immutable_and_sequenced() {
        let handle = fleet();
        let monitor = StatusMonitor::new(handle.clone(), &MonitorConfig::default());

        let first = monitor.snapshot();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.count_in(CircuitState::Closed), 2);

        handle.breaker("db").unwrap().request_open("test");
        let second = monitor.snapshot();

        assert_eq!(second.sequence, 2);
        assert_eq!(second.get("db").unwrap().state, CircuitState::Open);
        // Earlier snapshot is untouched.
        assert_eq!(first.get("db").unwrap().state, CircuitState::Closed);
        assert_eq!(monitor.latest().sequence, 2);
    }

    #[test]
    fn test_latest_never_goes_backwards() {
        let monitor = StatusMonitor::new(fleet(), &MonitorConfig::default());
        let older = monitor.snapshot();
        let newer = monitor.snapshot();

        // An older snapshot finishing last must not replace the newer one.
        monitor.publish(&older);
        assert_eq!(monitor.latest().sequence, newer.sequence);
    }

    #[test]
    fn test_concurrent_snapshots_keep_latest_monotonic() {
        let monitor = Arc::new(StatusMonitor::new(fleet(), &MonitorConfig::default()));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let taken = monitor.snapshot();
                        assert!(monitor.latest().sequence >= taken.sequence);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(monitor.latest().sequence, 800);
    }

    #[tokio::test]
    async fn test_tick_pushes_report() {
        let monitor = StatusMonitor::new(
            fleet(),
            &MonitorConfig {
                instance_name: Some("edge-1".into()),
                ..MonitorConfig::default()
            },
        );
        let (sink, mut rx) = ChannelSink::channel(2);
        let sinks: Vec<Box<dyn TelemetrySink>> = vec![Box::new(sink)];

        monitor.tick(&sinks).await;
        let report = rx.recv().await.unwrap();
        assert_eq!(report.instance_id, monitor.instance_id());
        assert_eq!(report.instance_name.as_deref(), Some("edge-1"));
        assert_eq!(report.sequence, 1);
        assert_eq!(report.snapshot.breakers.len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let monitor = Arc::new(StatusMonitor::new(fleet(), &MonitorConfig::default()));
        let (sink, mut rx) = ChannelSink::channel(16);
        let (tx, shutdown) = broadcast::channel(1);

        let task = tokio::spawn(monitor.clone().run(Duration::from_millis(10), vec![Box::new(sink)], shutdown));
        assert!(rx.recv().await.is_some());

        tx.send(()).unwrap();
        task.await.unwrap();
        assert!(monitor.latest().sequence >= 1);
    }
}
