//! Graceful Shutdown Handling
//!
//! Turns SIGTERM/SIGINT into a broadcast that stops the relay listener, closes
//! open WebSocket sessions with a "going away" frame, and waits for them to
//! drain.

use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::Result;

/// Fans a single shutdown signal out to every background component
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast the shutdown signal without waiting for an OS signal
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!("No shutdown subscribers: {}", e);
        }
    }

    /// Resolve on SIGTERM or SIGINT (Ctrl+C elsewhere), then broadcast
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!("Received {}, initiating graceful shutdown", name);
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Broadcast shutdown and drain the relay's connections
    pub async fn shutdown_connection_manager(&self, connection_manager: &ConnectionManager) -> Result<()> {
        self.trigger();
        connection_manager.shutdown().await?;

        let still_online = connection_manager.registry().len();
        if still_online > 0 {
            warn!("{} identities still registered after drain", still_online);
        }

        Ok(())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that receives the coordinator's shutdown signal
pub struct ShutdownAwareTask {
    name: String,
    handle: JoinHandle<()>,
}

impl ShutdownAwareTask {
    pub fn spawn<F, Fut>(
        shutdown_coordinator: &ShutdownCoordinator,
        task_name: &str,
        task_fn: F,
    ) -> Self
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown_rx = shutdown_coordinator.subscribe();
        let name = task_name.to_string();

        let task = name.clone();
        let handle = tokio::spawn(async move {
            debug!(task = %task, "Task started");
            task_fn(shutdown_rx).await;
            debug!(task = %task, "Task stopped");
        });

        Self { name, handle }
    }

    /// Give the task `grace` to wind down, then abort it
    pub async fn finish(self, grace: Duration) -> Result<()> {
        let Self { name, mut handle } = self;

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_cancelled() => Ok(()),
            Ok(Err(e)) => Err(anyhow::anyhow!("Task {} failed: {}", name, e)),
            Err(_) => {
                warn!(task = %name, "Task still running after {:?}, aborting", grace);
                handle.abort();
                Ok(())
            }
        }
    }
}
