//! Aggregator HTTP server.
//!
//! # Responsibilities
//! - Build the Axum router for report ingestion and status queries
//! - Guard mutating endpoints with the optional bearer key
//! - Serve until the shutdown broadcast fires

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AggregatorConfig;
use crate::fleet::FleetHandle;
use crate::http::{auth, handlers};
use crate::monitor::{Aggregator, StatusMonitor};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    /// Local monitor, when this process also runs breakers.
    pub monitor: Option<Arc<StatusMonitor>>,
    pub fleet: Option<Arc<FleetHandle>>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>, config: &AggregatorConfig) -> Self {
        Self {
            aggregator,
            monitor: None,
            fleet: None,
            api_key: config.api_key.as_deref().map(Arc::from),
        }
    }

    pub fn with_local(mut self, fleet: Arc<FleetHandle>, monitor: Option<Arc<StatusMonitor>>) -> Self {
        self.fleet = Some(fleet);
        self.monitor = monitor;
        self
    }
}

/// HTTP front end of the aggregator.
pub struct AggregatorServer {
    router: Router,
}

impl AggregatorServer {
    pub fn new(state: AppState, config: &AggregatorConfig) -> Self {
        let router = Self::build_router(state, Duration::from_secs(config.request_timeout_secs));
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        let protected = Router::new()
            .route("/v1/reports", post(handlers::ingest_report))
            .route("/v1/breakers/{name}/reset", post(handlers::reset_breaker))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

        Router::new()
            .route("/health", get(handlers::health))
            .route("/v1/status", get(handlers::global_status))
            .route("/v1/instances", get(handlers::list_instances))
            .route("/v1/snapshot", get(handlers::local_snapshot))
            .merge(protected)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    /// Router without a listener, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Aggregator server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Aggregator server received shutdown signal, draining");
            })
            .await?;

        tracing::info!("Aggregator server stopped");
        Ok(())
    }
}
