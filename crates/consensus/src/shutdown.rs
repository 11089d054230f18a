//! Shutdown signal raised by `Halt`

use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

/// One-way latch telling the hosting process to stop serving
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal now
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Raise the signal from a separate task after `grace`, so the caller can
    /// still finish replying
    pub fn trigger_after(&self, grace: Duration) {
        let signal = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    signal.trigger();
                });
            }
            Err(_) => signal.trigger(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has been raised
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
