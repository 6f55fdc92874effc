//! End-to-end breaker behaviour on a manual clock.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use faultline::adaptive::{FnPredictor, PredictError, TelemetryWindow, ThresholdAdapter};
use faultline::graph::{CascadePolicy, GraphBuilder, GraphError};
use faultline::resilience::{CallError, CircuitState, FailureKind, TransitionCause};

mod common;

#[tokio::test]
async fn test_weighted_failures_open_at_threshold() {
    let (breaker, _clock) = common::manual_breaker(&common::dependency("inventory", 3.0));

    common::fail_timeout(&breaker).await;
    common::fail_timeout(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_score(), 2.0);

    common::fail_error(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.failure_score(), 4.0);

    let mut ran = false;
    let result = breaker
        .call(|| {
            ran = true;
            async { Ok::<_, io::Error>(()) }
        })
        .await;
    assert!(matches!(result, Err(CallError::Open { .. })));
    assert!(!ran, "operation must not run while open");

    let status = breaker.status();
    assert_eq!(status.counters.failures, 3);
    assert_eq!(status.counters.rejections, 1);
    assert_eq!(status.last_failure, Some(FailureKind::Error));
}

#[tokio::test]
async fn test_retry_window_then_probe() {
    let (breaker, clock) = common::manual_breaker(&common::dependency("inventory", 3.0));
    breaker.request_open("operator");
    assert_eq!(breaker.retry_window(), Duration::from_secs(10));

    clock.advance(Duration::from_secs(5));
    match breaker.call(|| async { Ok::<_, io::Error>(()) }).await {
        Err(CallError::Open { retry_in, .. }) => assert_eq!(retry_in, Duration::from_secs(5)),
        other => panic!("expected rejection, got {:?}", other.map(|_| ())),
    }

    clock.advance(Duration::from_secs(6));
    assert!(common::succeed(&breaker).await);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_score(), 0.0);
    assert_eq!(breaker.status().counters.probes, 1);
}

#[tokio::test]
async fn test_failed_probe_grows_retry_window() {
    let (breaker, clock) = common::manual_breaker(&common::dependency("inventory", 3.0));
    for _ in 0..2 {
        common::fail_error(&breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    clock.advance(Duration::from_secs(10));
    common::fail_error(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    let window = breaker.retry_window();
    assert!(window >= Duration::from_secs(20), "window {:?}", window);
    assert!(window <= Duration::from_secs(22), "window {:?}", window);

    // Still inside the grown window.
    clock.advance(Duration::from_secs(15));
    assert!(matches!(
        breaker.call(|| async { Ok::<_, io::Error>(()) }).await,
        Err(CallError::Open { .. })
    ));
}

#[tokio::test]
async fn test_underlying_error_passes_through() {
    let (breaker, _clock) = common::manual_breaker(&common::dependency("inventory", 10.0));
    let err = breaker
        .call(|| async { Err::<(), _>(common::refused()) })
        .await
        .unwrap_err();

    let inner = err.into_underlying().unwrap();
    assert_eq!(inner.kind(), io::ErrorKind::ConnectionRefused);
}

#[tokio::test]
async fn test_call_timeout_counts_as_timeout() {
    let mut config = common::dependency("slow", 10.0);
    config.call_timeout_ms = Some(20);
    let (breaker, _clock) = common::manual_breaker(&config);

    let result = breaker
        .call(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, io::Error>(())
        })
        .await;

    assert!(matches!(result, Err(CallError::Timeout { .. })));
    assert_eq!(breaker.failure_score(), 1.0);
    assert_eq!(breaker.status().last_failure, Some(FailureKind::Timeout));
}

#[tokio::test]
async fn test_hung_half_open_call_cannot_pin_breaker() {
    let mut config = common::dependency("inventory", 3.0);
    config.half_open_probe_timeout_ms = 50;
    let (breaker, clock) = common::manual_breaker(&config);
    breaker.request_open("operator");
    clock.advance(Duration::from_secs(11));

    let hung = breaker
        .call(|| std::future::pending::<Result<(), io::Error>>())
        .await;
    assert!(matches!(hung, Err(CallError::Timeout { .. })));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.status().in_flight_probes, 0);
    assert_eq!(breaker.status().last_failure, Some(FailureKind::Timeout));

    clock.advance(Duration::from_secs(3600));
    for _ in 0..100 {
        assert!(common::succeed(&breaker).await);
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.status().counters.rejections, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_callers_share_one_probe() {
    let (breaker, clock) = common::manual_breaker(&common::dependency("inventory", 3.0));
    breaker.request_open("operator");
    clock.advance(Duration::from_secs(11));

    let gate = Arc::new(Notify::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let breaker = breaker.clone();
        let gate = gate.clone();
        handles.push(tokio::spawn(async move {
            breaker
                .call(|| async move {
                    gate.notified().await;
                    Ok::<_, io::Error>(())
                })
                .await
        }));
    }

    // Let every caller reach admission while the probe is parked.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(breaker.status().in_flight_probes, 1);
    gate.notify_one();

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(CallError::Open { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(rejected, 7);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn test_threshold_clamped_for_non_finite_values() {
    let (breaker, _clock) = common::manual_breaker(&common::dependency("inventory", 3.0));
    let (min, max) = breaker.threshold_bounds();

    assert_eq!(breaker.set_threshold(f64::NAN), min);
    assert_eq!(breaker.set_threshold(f64::INFINITY), max);
    assert_eq!(breaker.set_threshold(f64::NEG_INFINITY), min);
    assert_eq!(breaker.set_threshold(5.0), 5.0);
}

#[test]
fn test_predictor_failure_keeps_last_threshold() {
    let window = TelemetryWindow::new(Duration::from_secs(60));

    let failing = ThresholdAdapter::new(2.0, 20.0, 7.0)
        .with_min_samples(0)
        .with_predictor(Arc::new(FnPredictor(|_: &[f64]| -> Result<f64, PredictError> {
            Err(PredictError::Unavailable("model not loaded".into()))
        })));
    assert_eq!(failing.update_threshold(&window), 7.0);

    let nan = ThresholdAdapter::new(2.0, 20.0, 7.0)
        .with_min_samples(0)
        .with_predictor(Arc::new(FnPredictor(|_: &[f64]| -> Result<f64, PredictError> {
            Ok(f64::NAN)
        })));
    assert_eq!(nan.update_threshold(&window), 7.0);
}

#[test]
fn test_rejected_cycle_leaves_graph_unchanged() {
    let mut builder = GraphBuilder::new();
    for name in ["web", "api", "db"] {
        let (breaker, _clock) = common::manual_breaker(&common::dependency(name, 3.0));
        builder.add_breaker(breaker).unwrap();
    }
    builder.add_edge("web", "api", CascadePolicy::FailFast).unwrap();
    builder.add_edge("api", "db", CascadePolicy::FailFast).unwrap();

    for _ in 0..2 {
        let err = builder.add_edge("db", "web", CascadePolicy::FailFast).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
        assert_eq!(builder.edge_count(), 2);
    }

    let graph = builder.build();
    assert_eq!(graph.topological_order(), vec!["db", "api", "web"]);
}

#[tokio::test]
async fn test_cascade_transition_carries_origin() {
    struct Recorder(std::sync::Mutex<Vec<TransitionCause>>);
    impl faultline::resilience::TransitionObserver for Recorder {
        fn on_transition(&self, event: &faultline::resilience::TransitionEvent) {
            self.0.lock().unwrap().push(event.cause.clone());
        }
    }

    let (breaker, _clock) = common::manual_breaker(&common::dependency("web", 3.0));
    let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
    let observer: Arc<dyn faultline::resilience::TransitionObserver> = recorder.clone();
    breaker.subscribe(Arc::downgrade(&observer));

    assert!(breaker.request_open("db"));
    assert!(!breaker.request_open("db"));

    let causes = recorder.0.lock().unwrap();
    assert_eq!(
        *causes,
        vec![TransitionCause::Cascade {
            origin: "db".to_string()
        }]
    );
}
