use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Holds running tasks and the shutdown channel for the host.
/// Call `shutdown()` to gracefully stop services.
pub struct ServiceHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handles: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl ServiceHandle {
    /// Wrap an externally owned shutdown channel; the RPC server hands out
    /// the sender so the whole process shares one signal.
    pub fn new(shutdown_tx: watch::Sender<bool>) -> Self {
        ServiceHandle { shutdown_tx, join_handles: vec![] }
    }

    /// Attach a background task handle (so we wait on it on shutdown).
    pub fn attach(&mut self, h: JoinHandle<anyhow::Result<()>>) {
        self.join_handles.push(h);
    }

    /// Signal shutdown to all tasks and await them sequentially.
    pub async fn shutdown(self) -> Result<()> {
        // Signal shutdown
        let _ = self.shutdown_tx.send(true);

        // Wait for tasks to complete
        for h in self.join_handles {
            match h.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("service task returned error: {:?}", e),
                Err(e) => tracing::error!("task join error: {:?}", e),
            }
        }
        Ok(())
    }

    /// Return a cloneable shutdown receiver for tasks that need to observe shutdown state.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}
