//! Shutdown coordination for the daemon's background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Every long-running loop (adapter, monitor, eviction, HTTP server)
/// subscribes and exits when the signal fires.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Later calls are no-ops.
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for `tasks` to finish, aborting whatever is left after
    /// `deadline`. Returns true if every task exited on its own.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, deadline: Duration) -> bool {
        let total = tasks.len();
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();

        let joined = tokio::time::timeout(deadline, async move {
            for task in tasks {
                if let Err(e) = task.await {
                    if e.is_panic() {
                        tracing::error!(error = %e, "Background task panicked during shutdown");
                    }
                }
            }
        })
        .await;

        match joined {
            Ok(()) => {
                tracing::info!(tasks = total, "All background tasks drained");
                true
            }
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                tracing::warn!(
                    tasks = total,
                    deadline = ?deadline,
                    "Shutdown deadline exceeded, aborting remaining tasks"
                );
                false
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
