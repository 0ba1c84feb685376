use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A background loop with an explicit shutdown channel.
///
/// The loop body receives a `watch::Receiver<bool>` and must return once it
/// observes a change. [`Supervised::shutdown`] signals and then joins the task,
/// so no cycle is left running after it returns.
pub struct Supervised {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Supervised {
    /// Spawn `body` with the shutdown receiver it must watch.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(body(shutdown_rx));
        info!(task = name, "background task started");
        Self {
            name,
            shutdown_tx,
            handle,
        }
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        match self.handle.await {
            Ok(()) => info!(task = self.name, "background task stopped"),
            Err(e) => warn!(task = self.name, error = %e, "background task ended abnormally"),
        }
    }
}
