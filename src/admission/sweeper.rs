//! Background reclamation of expired windows.
//!
//! Lazy reclamation only recycles a slot when the same key is seen again, so
//! clients that never come back would otherwise stay in memory forever. The
//! sweeper trades a periodic full pass over the map for bounded memory.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::controller::AdmissionController;

/// Shortest interval the sweeper will run at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a running sweep task.
#[derive(Debug)]
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a task that sweeps `controller` every `interval`.
    ///
    /// Intervals below [`MIN_SWEEP_INTERVAL`] are raised to it. Must be
    /// called from within a tokio runtime.
    pub fn spawn(controller: Arc<AdmissionController>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let interval = if interval < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                min_ms = MIN_SWEEP_INTERVAL.as_millis() as u64,
                "Sweep interval too short, clamping"
            );
            MIN_SWEEP_INTERVAL
        } else {
            interval
        };

        info!(interval_ms = interval.as_millis() as u64, "Starting window sweeper");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = controller.sweep_expired();
                        debug!(
                            removed = removed,
                            slots = controller.active_slots(),
                            "Sweep pass complete"
                        );
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Window sweeper received shutdown");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the sweep task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        match self.handle.await {
            Ok(()) => info!("Window sweeper stopped"),
            Err(e) => error!(error = %e, "Window sweeper task failed"),
        }
    }
}
