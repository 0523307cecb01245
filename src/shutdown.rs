//! Shutdown signalling shared by the supervisor, keepalive loop and executor
//!
//! A single [`ShutdownTrigger`] fans out to any number of cloned
//! [`ShutdownSignal`]s. Once fired the signal stays fired.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Fires the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Request shutdown; idempotent
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    /// New signal observing this trigger
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // the receiver keeps reporting `false` once the sender is gone
        drop(tx);
        Self { rx }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested
    ///
    /// If every trigger is dropped without firing this never resolves.
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `delay` unless shutdown is requested first
    /// Returns true if sleep completed, false if shutdown requested
    pub async fn interruptible_sleep(&self, delay: Duration) -> bool {
        let mut signal = self.clone();
        tokio::select! {
            _ = signal.requested() => false,
            _ = tokio::time::sleep(delay) => !self.is_requested(),
        }
    }

    /// Fire `trigger` when this signal fires
    ///
    /// Used to link an externally owned shutdown to a component's internal one.
    pub fn forward_to(&self, trigger: &ShutdownTrigger) -> tokio::task::JoinHandle<()> {
        let mut outer = self.clone();
        let mut inner = trigger.signal();
        let trigger = trigger.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = outer.requested() => trigger.fire(),
                _ = inner.requested() => {}
            }
        })
    }
}
