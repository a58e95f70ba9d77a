//! Background reconciliation scheduler.
//!
//! A single perpetual tokio task: sleep one interval, run one sweep,
//! repeat. The scheduler owns its engine handle and its shutdown channel
//! explicitly; the process lifecycle starts and stops it. Cancellation is
//! cooperative: a stop request is only honored between sweeps, so an
//! in-flight sweep (and every per-item transaction inside it) always runs
//! to completion.

use crate::ports::inbound::FulfillmentApi;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Periodically drives the fulfillment engine over all eligible work.
pub struct ReconciliationScheduler {
    engine: Arc<dyn FulfillmentApi>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReconciliationScheduler {
    /// Creates a scheduler sweeping every `interval`.
    pub fn new(engine: Arc<dyn FulfillmentApi>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            engine,
            interval,
            shutdown_tx,
            shutdown_rx,
            handle: Mutex::new(None),
        }
    }

    /// Spawns the sweep loop. A second call while running is a warning,
    /// not a second loop.
    pub fn start(&self) {
        let mut slot = self.handle.lock().unwrap();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("reconciliation scheduler already running");
            return;
        }
        let _ = self.shutdown_tx.send(false);

        info!(
            interval_secs = self.interval.as_secs(),
            "starting reconciliation scheduler"
        );
        let engine = Arc::clone(&self.engine);
        let interval = self.interval;
        let mut shutdown = self.shutdown_rx.clone();
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let report = engine.run_sweep();
                        if report.is_quiet() {
                            debug!("sweep found nothing to reconcile");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("reconciliation scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// Requests shutdown and waits for the loop to finish. An in-flight
    /// sweep completes first; no further sweeps start.
    pub async fn stop(&self) {
        let handle = self.handle.lock().unwrap().take();
        match handle {
            Some(handle) => {
                let _ = self.shutdown_tx.send(true);
                if let Err(e) = handle.await {
                    warn!(error = %e, "reconciliation task ended abnormally");
                }
                info!("reconciliation scheduler stopped");
            }
            None => debug!("stop requested but the scheduler was not running"),
        }
    }

    /// True while the sweep loop is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
