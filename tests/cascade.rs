//! Failure propagation across a fleet's dependency graph.

use std::time::Duration;

use faultline::config::{EdgeConfig, FleetConfig, MonitorConfig};
use faultline::graph::CascadePolicy;
use faultline::monitor::StatusMonitor;
use faultline::resilience::{CircuitState, TransitionCause};

mod common;

fn edge(parent: &str, child: &str, policy: CascadePolicy) -> EdgeConfig {
    EdgeConfig {
        parent: parent.into(),
        child: child.into(),
        policy,
    }
}

fn checkout_fleet() -> FleetConfig {
    FleetConfig {
        dependencies: vec![
            common::dependency("checkout", 4.0),
            common::dependency("payments", 4.0),
            common::dependency("ledger", 4.0),
            common::dependency("search", 4.0),
            common::dependency("recommendations", 4.0),
        ],
        edges: vec![
            edge("checkout", "payments", CascadePolicy::FailFast),
            edge("payments", "ledger", CascadePolicy::FailFast),
            edge("search", "recommendations", CascadePolicy::SoftPressure { weight: 1.5 }),
        ],
        ..FleetConfig::default()
    }
}

#[tokio::test]
async fn test_fail_fast_opens_whole_chain() {
    let (fleet, _clock) = common::manual_fleet(checkout_fleet());
    let mut transitions = fleet.subscribe_transitions();

    let ledger = fleet.breaker("ledger").unwrap();
    common::fail_error(&ledger).await;
    common::fail_error(&ledger).await;

    assert_eq!(ledger.state(), CircuitState::Open);
    assert_eq!(fleet.breaker("payments").unwrap().state(), CircuitState::Open);
    assert_eq!(fleet.breaker("checkout").unwrap().state(), CircuitState::Open);
    // Unrelated subtree untouched.
    assert_eq!(fleet.breaker("search").unwrap().state(), CircuitState::Closed);

    let first = transitions.recv().await.unwrap();
    assert_eq!(first.dependency, "ledger");
    assert_eq!(first.cause, TransitionCause::Threshold);

    let mut cascaded = Vec::new();
    while let Ok(event) = transitions.try_recv() {
        assert_eq!(
            event.cause,
            TransitionCause::Cascade {
                origin: "ledger".into()
            }
        );
        cascaded.push(event.dependency);
    }
    cascaded.sort();
    assert_eq!(cascaded, vec!["checkout".to_string(), "payments".to_string()]);
}

#[tokio::test]
async fn test_soft_pressure_accumulates() {
    let (fleet, _clock) = common::manual_fleet(checkout_fleet());
    let recommendations = fleet.breaker("recommendations").unwrap();
    let search = fleet.breaker("search").unwrap();

    common::fail_error(&recommendations).await;
    common::fail_error(&recommendations).await;
    assert_eq!(recommendations.state(), CircuitState::Open);
    assert_eq!(search.state(), CircuitState::Closed);
    assert_eq!(search.failure_score(), 1.5);

    // Own failures on top of the pressure push search over its threshold.
    common::fail_error(&search).await;
    assert_eq!(search.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_recovered_child_does_not_close_parent() {
    let (fleet, clock) = common::manual_fleet(checkout_fleet());
    let ledger = fleet.breaker("ledger").unwrap();
    common::fail_error(&ledger).await;
    common::fail_error(&ledger).await;

    clock.advance(Duration::from_secs(11));
    assert!(common::succeed(&ledger).await);
    assert_eq!(ledger.state(), CircuitState::Closed);

    // Parents recover through their own probes.
    let payments = fleet.breaker("payments").unwrap();
    assert_ne!(payments.state(), CircuitState::Closed);
    assert!(common::succeed(&payments).await);
    assert_eq!(payments.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cascade_survives_reload() {
    let (fleet, _clock) = common::manual_fleet(checkout_fleet());

    let mut next = checkout_fleet();
    next.edges.push(edge("search", "ledger", CascadePolicy::FailFast));
    fleet.reload(&next).unwrap();

    let ledger = fleet.breaker("ledger").unwrap();
    common::fail_error(&ledger).await;
    common::fail_error(&ledger).await;

    assert_eq!(fleet.breaker("search").unwrap().state(), CircuitState::Open);
    assert_eq!(fleet.breaker("checkout").unwrap().state(), CircuitState::Open);
}

#[tokio::test]
async fn test_snapshot_reflects_cascade() {
    let (fleet, _clock) = common::manual_fleet(checkout_fleet());
    let monitor = StatusMonitor::new(fleet.clone(), &MonitorConfig::default());

    let ledger = fleet.breaker("ledger").unwrap();
    common::fail_error(&ledger).await;
    common::fail_error(&ledger).await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.count_in(CircuitState::Open), 3);
    assert_eq!(snapshot.count_in(CircuitState::Closed), 2);
    assert_eq!(snapshot.get("ledger").unwrap().counters.failures, 2);
    assert_eq!(snapshot.get("checkout").unwrap().counters.failures, 0);
}
