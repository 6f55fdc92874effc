//! OS signal handling.
//!
//! Ctrl-C and SIGTERM trigger graceful shutdown. SIGHUP re-reads the
//! configuration file and hands it to the reload task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::FleetConfig;
use crate::lifecycle::shutdown::Shutdown;

/// Re-reads the config file on demand and forwards it for reload.
#[derive(Clone)]
pub struct ReloadTrigger {
    path: PathBuf,
    tx: mpsc::UnboundedSender<FleetConfig>,
}

impl ReloadTrigger {
    pub fn new(path: &Path, tx: mpsc::UnboundedSender<FleetConfig>) -> Self {
        Self {
            path: path.to_path_buf(),
            tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load, validate and forward the config. An invalid file is reported
    /// and nothing is sent.
    pub fn fire(&self) -> Result<(), ConfigError> {
        let config = load_config(&self.path)?;
        if self.tx.send(config).is_err() {
            tracing::warn!(path = ?self.path, "Reload channel closed, config dropped");
        }
        Ok(())
    }
}

/// Wait for termination signals until shutdown, handling SIGHUP reloads
/// along the way.
pub async fn listen(shutdown: Arc<Shutdown>, reload: Option<ReloadTrigger>) {
    let mut stop = shutdown.subscribe();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(term), Ok(hup)) => (term, hup),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to install unix signal handlers, only Ctrl-C is handled");
                wait_for_ctrl_c(&shutdown, stop).await;
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl-C, shutting down");
                    shutdown.trigger();
                    break;
                }
                _ = term.recv() => {
                    tracing::info!("Received SIGTERM, shutting down");
                    shutdown.trigger();
                    break;
                }
                _ = hup.recv() => match &reload {
                    Some(trigger) => {
                        tracing::info!(path = ?trigger.path(), "Received SIGHUP, reloading configuration");
                        if let Err(e) = trigger.fire() {
                            tracing::error!(error = %e, "Failed to reload config, keeping current fleet");
                        }
                    }
                    None => tracing::info!("Received SIGHUP without a config file, ignoring"),
                },
                _ = stop.recv() => break,
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = reload;
        wait_for_ctrl_c(&shutdown, stop).await;
    }
}

async fn wait_for_ctrl_c(shutdown: &Shutdown, mut stop: tokio::sync::broadcast::Receiver<()>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Received Ctrl-C, shutting down");
            shutdown.trigger();
        }
        _ = stop.recv() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_reload_trigger_forwards_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[dependencies]]\nname = \"db\"").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let trigger = ReloadTrigger::new(file.path(), tx);
        trigger.fire().unwrap();

        let config = rx.try_recv().unwrap();
        assert_eq!(config.dependencies[0].name, "db");
    }

    #[test]
    fn test_reload_trigger_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[dependencies]]\nname = \"\"").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let trigger = ReloadTrigger::new(file.path(), tx);
        assert!(matches!(trigger.fire(), Err(ConfigError::Validation(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listen_exits_on_shutdown() {
        let shutdown = Arc::new(Shutdown::new());
        let task = tokio::spawn(listen(shutdown.clone(), None));

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
