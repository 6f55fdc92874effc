//! Ordered startup of the daemon.
//!
//! # Responsibilities
//! - Validate config and build the fleet before anything is spawned
//! - Start metrics, the adapter loop, the status monitor, the aggregator
//!   and the config reload task, each on the shared shutdown broadcast
//! - Hand back a `Runtime` that owns every spawned task
//!
//! # Design Decisions
//! - Config, graph and listener failures abort startup with a typed error
//!   before any task is spawned
//! - Reloads only touch the fleet; listener and sink settings need a restart

use std::net::{AddrParseError, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::adaptive::run_adapter_loop;
use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;
use crate::config::watcher::ConfigWatcher;
use crate::config::FleetConfig;
use crate::fleet::FleetHandle;
use crate::graph::GraphError;
use crate::http::{AggregatorServer, AppState};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::ReloadTrigger;
use crate::monitor::{Aggregator, ChannelSink, HttpSink, LogSink, SinkError, StatusMonitor, TelemetrySink};
use crate::observability::metrics;

const REPORT_CHANNEL_CAPACITY: usize = 64;
const MIN_EVICTION_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("dependency graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("invalid address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("metrics exporter failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("telemetry sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

/// Everything started by [`start`].
pub struct Runtime {
    pub fleet: Arc<FleetHandle>,
    pub monitor: Option<Arc<StatusMonitor>>,
    pub aggregator: Option<Arc<Aggregator>>,
    pub shutdown: Arc<Shutdown>,
    aggregator_addr: Option<SocketAddr>,
    reload: Option<ReloadTrigger>,
    tasks: Vec<JoinHandle<()>>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl Runtime {
    /// Address the aggregator server actually bound to.
    pub fn aggregator_addr(&self) -> Option<SocketAddr> {
        self.aggregator_addr
    }

    /// SIGHUP reload hook, present when started from a config file.
    pub fn reload_trigger(&self) -> Option<ReloadTrigger> {
        self.reload.clone()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Trigger shutdown and wait up to `deadline` for every task.
    pub async fn stop(self, deadline: Duration) -> bool {
        self.shutdown.trigger();
        self.shutdown.drain(self.tasks, deadline).await
    }
}

fn parse_addr(address: &str) -> Result<SocketAddr, StartupError> {
    address.parse().map_err(|source| StartupError::Address {
        address: address.to_string(),
        source,
    })
}

/// Start every subsystem enabled in `config`.
///
/// When `config_path` is given the file is watched and reloaded on change.
pub async fn start(config: FleetConfig, config_path: Option<&Path>) -> Result<Runtime, StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    if config.observability.metrics_enabled {
        let addr = parse_addr(&config.observability.metrics_address)?;
        metrics::init_metrics(addr)?;
        tracing::info!(address = %addr, "Metrics exporter listening");
    }

    let fleet = Arc::new(FleetHandle::from_config(&config)?);
    let listener = if config.aggregator.enabled {
        Some(TcpListener::bind(&config.aggregator.bind_address).await?)
    } else {
        None
    };
    let shutdown = Arc::new(Shutdown::new());
    let mut tasks = Vec::new();

    tracing::info!(
        dependencies = config.dependencies.len(),
        edges = config.edges.len(),
        adapter = config.adapter.enabled,
        monitor = config.monitor.enabled,
        aggregator = config.aggregator.enabled,
        "Configuration loaded"
    );

    if config.adapter.enabled {
        let interval = Duration::from_millis(config.adapter.interval_ms);
        tasks.push(tokio::spawn(run_adapter_loop(fleet.clone(), interval, shutdown.subscribe())));
    }

    let aggregator = config.aggregator.enabled.then(|| {
        let stale_after = Duration::from_secs(config.aggregator.stale_after_secs);
        Arc::new(Aggregator::new(stale_after))
    });

    let monitor = if config.monitor.enabled {
        let monitor = Arc::new(StatusMonitor::new(fleet.clone(), &config.monitor));
        let mut sinks: Vec<Box<dyn TelemetrySink>> = Vec::new();

        if config.monitor.log_snapshots {
            sinks.push(Box::new(LogSink));
        }
        if let Some(url) = &config.monitor.push_url {
            let timeout = Duration::from_millis(config.monitor.push_timeout_ms);
            sinks.push(Box::new(HttpSink::new(url.clone(), config.monitor.push_api_key.clone(), timeout)?));
        }
        if let Some(aggregator) = &aggregator {
            let (sink, reports) = ChannelSink::channel(REPORT_CHANNEL_CAPACITY);
            sinks.push(Box::new(sink));
            // Ends once the monitor drops its sink on shutdown.
            tasks.push(tokio::spawn(aggregator.clone().consume(reports)));
        }

        let interval = Duration::from_millis(config.monitor.interval_ms);
        tasks.push(tokio::spawn(monitor.clone().run(interval, sinks, shutdown.subscribe())));
        Some(monitor)
    } else {
        None
    };

    let mut aggregator_addr = None;
    if let (Some(aggregator), Some(listener)) = (&aggregator, listener) {
        aggregator_addr = Some(listener.local_addr()?);
        let stale_after = Duration::from_secs(config.aggregator.stale_after_secs);
        let eviction_interval = (stale_after / 2).max(MIN_EVICTION_INTERVAL);
        tasks.push(tokio::spawn(aggregator.clone().run_eviction(eviction_interval, shutdown.subscribe())));

        let state = AppState::new(aggregator.clone(), &config.aggregator).with_local(fleet.clone(), monitor.clone());
        let server = AggregatorServer::new(state, &config.aggregator);
        let server_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(listener, server_shutdown).await {
                tracing::error!(error = %e, "Aggregator server failed");
            }
        }));
    }

    let (watcher, reload) = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let reload = ReloadTrigger::new(path, watcher.sender());
            let handle = watcher.run()?;
            tasks.push(tokio::spawn(run_reload_loop(fleet.clone(), updates, shutdown.subscribe())));
            (Some(handle), Some(reload))
        }
        None => (None, None),
    };

    tracing::info!(tasks = tasks.len(), "Startup complete");

    Ok(Runtime {
        fleet,
        monitor,
        aggregator,
        shutdown,
        aggregator_addr,
        reload,
        tasks,
        _watcher: watcher,
    })
}

/// Apply validated configs to the fleet until shutdown.
async fn run_reload_loop(
    fleet: Arc<FleetHandle>,
    mut updates: mpsc::UnboundedReceiver<FleetConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match fleet.reload(&config) {
                    Ok(()) => tracing::info!(
                        dependencies = config.dependencies.len(),
                        edges = config.edges.len(),
                        "Configuration reloaded"
                    ),
                    Err(e) => tracing::error!(error = %e, "Rejected reloaded configuration, keeping current fleet"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Config reload task received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
