//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use faultline::config::{AggregatorConfig, DependencyConfig, FailureWeights, FleetConfig};
use faultline::fleet::FleetHandle;
use faultline::http::{AggregatorServer, AppState};
use faultline::lifecycle::Shutdown;
use faultline::monitor::Aggregator;
use faultline::resilience::{CircuitBreaker, Clock, ManualClock, TimeoutError};

/// Dependency with deterministic scoring: no time decay, no success decay,
/// probes always admitted.
pub fn dependency(name: &str, threshold: f64) -> DependencyConfig {
    DependencyConfig {
        base_threshold: threshold,
        min_threshold: 1.0,
        max_threshold: threshold.max(1.0) * 4.0,
        failure_weights: FailureWeights {
            timeout: 1.0,
            error: 2.0,
            degraded: 0.5,
        },
        decay_half_life_ms: None,
        success_decay: 1.0,
        half_open_probe_probability: 1.0,
        ..DependencyConfig::named(name)
    }
}

/// Breaker on a manual clock.
pub fn manual_breaker(config: &DependencyConfig) -> (Arc<CircuitBreaker>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    (Arc::new(CircuitBreaker::with_clock(config, dyn_clock)), clock)
}

/// Fleet on a manual clock with the adapter disabled.
pub fn manual_fleet(mut config: FleetConfig) -> (Arc<FleetHandle>, Arc<ManualClock>) {
    config.adapter.enabled = false;
    let clock = Arc::new(ManualClock::new());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let handle = FleetHandle::with_clock(&config, dyn_clock).unwrap();
    (Arc::new(handle), clock)
}

pub fn refused() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")
}

pub async fn fail_error(breaker: &CircuitBreaker) {
    let _ = breaker.call(|| async { Err::<(), _>(refused()) }).await;
}

pub async fn fail_timeout(breaker: &CircuitBreaker) {
    let _ = breaker
        .call(|| async { Err::<(), _>(TimeoutError(Duration::from_millis(100))) })
        .await;
}

pub async fn succeed(breaker: &CircuitBreaker) -> bool {
    breaker.call(|| async { Ok::<_, io::Error>(()) }).await.is_ok()
}

/// Aggregator server on an ephemeral local port.
pub async fn start_aggregator(api_key: Option<&str>) -> (SocketAddr, Arc<Aggregator>, Shutdown) {
    let config = AggregatorConfig {
        enabled: true,
        api_key: api_key.map(str::to_string),
        ..AggregatorConfig::default()
    };
    let aggregator = Arc::new(Aggregator::new(Duration::from_secs(config.stale_after_secs)));
    let server = AggregatorServer::new(AppState::new(aggregator.clone(), &config), &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, aggregator, shutdown)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
