//! faultline daemon.
//!
//! Loads a fleet configuration, starts the breakers' background tasks
//! (threshold adaptation, status monitor, optional aggregator server) and
//! runs until Ctrl-C or SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use faultline::config::loader::load_config;
use faultline::lifecycle::{self, signals};
use faultline::observability::logging::init_logging;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "faultline")]
#[command(about = "Adaptive circuit breaker fleet daemon", long_about = None)]
struct Args {
    /// Path to the TOML fleet configuration.
    #[arg(short, long, default_value = "faultline.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    if args.check {
        println!(
            "{}: OK ({} dependencies, {} edges)",
            args.config.display(),
            config.dependencies.len(),
            config.edges.len()
        );
        return Ok(());
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?args.config, "faultline starting");

    let runtime = lifecycle::start(config, Some(&args.config)).await?;
    if let Some(addr) = runtime.aggregator_addr() {
        tracing::info!(address = %addr, "Aggregator listening");
    }

    signals::listen(runtime.shutdown.clone(), runtime.reload_trigger()).await;

    if !runtime.stop(SHUTDOWN_DEADLINE).await {
        tracing::warn!("Forced shutdown after deadline");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
