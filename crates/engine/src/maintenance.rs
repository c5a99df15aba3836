//! Periodic maintenance task.
//!
//! One cancellable background routine per process. Each tick delegates to
//! [`SyncEngine::maintenance_sweep`]: stale sync locks, aged in-memory
//! session handles, and physically expired session rows.

use crate::engine::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default interval between maintenance passes.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to the running maintenance task.
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal shutdown and wait for the task to finish its current pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Abort without waiting. Used on hard process teardown.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Spawn the maintenance loop.
pub fn spawn_maintenance(engine: Arc<SyncEngine>, interval: Duration) -> MaintenanceHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        // The first tick fires immediately; skip it so startup isn't
        // front-loaded with a sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    engine.maintenance_sweep().await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!("Maintenance task shutting down");
                        break;
                    }
                }
            }
        }
    });

    MaintenanceHandle {
        shutdown: shutdown_tx,
        task,
    }
}
