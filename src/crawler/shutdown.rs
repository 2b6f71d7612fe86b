//! Process-wide stop signal
//!
//! A cloneable handle over a `watch` channel. Workers poll it between steps and
//! wait on it while sleeping, so every suspension point observes a stop request.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signals every holder to stop; idempotent
    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Sleeps for `duration` unless a stop is requested first
    ///
    /// Returns false if the sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.subscribe();
        if *rx.borrow_and_update() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_requested(),
            _ = rx.wait_for(|stop| *stop) => false,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Ctrl+C handler: the first press stops gracefully, the second exits
pub fn install_ctrl_c(shutdown: Shutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Received Ctrl+C, finishing in-flight work (press again to force quit)");
        shutdown.request();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Force quit requested, exiting immediately");
            std::process::exit(130);
        }
    });
}
