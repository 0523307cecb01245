//! Single-slot "latest pending command" buffer
//!
//! Incoming payloads overwrite whatever is still waiting to be applied. A
//! dedicated worker applies only the most recent one, so at most one external
//! process runs at a time and a burst of messages collapses to its final state.

use super::payload::CommandPayload;
use super::ApplyCommand;
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Coalescing front of an [`ApplyCommand`] target
pub struct LatestCommandSlot {
    tx: watch::Sender<Option<CommandPayload>>,
    submitted: Arc<AtomicU64>,
    applied: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LatestCommandSlot {
    /// Start the worker applying commands to `target` until `shutdown` fires
    pub fn spawn(target: Arc<dyn ApplyCommand>, shutdown: ShutdownSignal) -> Self {
        let (tx, rx) = watch::channel(None);
        let submitted = Arc::new(AtomicU64::new(0));
        let applied = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(Self::run_worker(
            rx,
            target,
            shutdown,
            applied.clone(),
        ));

        Self {
            tx,
            submitted,
            applied,
            worker: Mutex::new(Some(handle)),
        }
    }

    async fn run_worker(
        mut rx: watch::Receiver<Option<CommandPayload>>,
        target: Arc<dyn ApplyCommand>,
        mut shutdown: ShutdownSignal,
        applied: Arc<AtomicU64>,
    ) {
        debug!("Command worker started");
        loop {
            tokio::select! {
                _ = shutdown.requested() => {
                    info!("Command worker stopping on shutdown");
                    break;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        debug!("Command slot closed, worker exiting");
                        break;
                    }
                    let pending = *rx.borrow_and_update();
                    if let Some(payload) = pending {
                        target.apply(payload).await;
                        applied.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    /// Replace the pending command; never blocks
    pub fn submit(&self, payload: CommandPayload) {
        let count = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            brightness = payload.brightness().value(),
            color = payload.color().value(),
            "Queued command #{}",
            count
        );
        self.tx.send_replace(Some(payload));
    }

    /// Number of payloads handed to [`submit`](Self::submit)
    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Number of payloads actually applied to the target
    pub fn applied_count(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Wait up to `timeout` for the worker to finish after shutdown
    pub async fn join(&self, timeout: Duration) {
        let handle = self.worker.lock().ok().and_then(|mut guard| guard.take());
        let Some(handle) = handle else {
            return;
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => debug!("Command worker shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Command worker ended with error: {}", e),
            Err(_) => warn!("Command worker didn't stop within {:?}", timeout),
            _ => {}
        }
    }
}

#[async_trait]
impl ApplyCommand for LatestCommandSlot {
    async fn apply(&self, payload: CommandPayload) {
        self.submit(payload);
    }
}

impl Drop for LatestCommandSlot {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.worker.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::RecordingApplier;

    #[tokio::test]
    async fn test_single_command_is_applied() {
        let target = Arc::new(RecordingApplier::new());
        let (_trigger, signal) = crate::shutdown::channel();
        let slot = LatestCommandSlot::spawn(target.clone(), signal);

        slot.submit(CommandPayload::new(60, 40));

        target.wait_for_count(1, Duration::from_secs(1)).await;
        assert_eq!(target.applied().await, vec![CommandPayload::new(60, 40)]);
        assert_eq!(slot.submitted_count(), 1);
    }

    #[tokio::test]
    async fn test_burst_collapses_to_latest() {
        let target = Arc::new(RecordingApplier::with_delay(Duration::from_millis(100)));
        let (_trigger, signal) = crate::shutdown::channel();
        let slot = LatestCommandSlot::spawn(target.clone(), signal);

        slot.submit(CommandPayload::new(10, 0));
        // let the worker pick up the first command and block in apply
        tokio::time::sleep(Duration::from_millis(20)).await;
        for brightness in 20..=90 {
            slot.submit(CommandPayload::new(brightness, 0));
        }

        target.wait_for_count(2, Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let applied = target.applied().await;
        assert_eq!(
            applied,
            vec![CommandPayload::new(10, 0), CommandPayload::new(90, 0)],
            "intermediate commands should be superseded"
        );
        assert_eq!(slot.submitted_count(), 72);
        assert_eq!(slot.applied_count(), 2);
        assert_eq!(target.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let target = Arc::new(RecordingApplier::new());
        let (trigger, signal) = crate::shutdown::channel();
        let slot = LatestCommandSlot::spawn(target.clone(), signal);

        trigger.fire();
        slot.join(Duration::from_secs(1)).await;

        slot.submit(CommandPayload::new(50, 50));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(target.applied().await.is_empty());
    }
}
