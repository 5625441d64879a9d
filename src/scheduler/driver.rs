//! Background task that calls `tick()` on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::service::ControlPlane;

/// Owns the background tick loop. Dropping the driver without calling
/// [`TickDriver::stop`] leaves the loop running until the runtime shuts down.
pub struct TickDriver {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<u64>,
}

impl TickDriver {
    /// Spawn the loop, or return `None` when the configured interval is 0.
    pub fn spawn(plane: Arc<ControlPlane>) -> Option<Self> {
        let interval = plane.config().scheduler.tick_interval()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(plane, interval, shutdown_rx));
        log::info!("Tick driver started (every {:?})", interval);
        Some(Self { shutdown_tx, handle })
    }

    /// Signal the loop to stop and wait for it. Returns the number of ticks run.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown_tx.send(true);
        match self.handle.await {
            Ok(ticks) => {
                log::info!("Tick driver stopped after {} tick(s)", ticks);
                ticks
            }
            Err(e) => {
                log::error!("Tick driver task failed: {}", e);
                0
            }
        }
    }
}

async fn run_loop(plane: Arc<ControlPlane>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> u64 {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let plane = plane.clone();
                match tokio::task::spawn_blocking(move || plane.tick()).await {
                    Ok(Ok(report)) => {
                        ticks += 1;
                        if report.processed > 0 {
                            log::debug!("Background tick promoted {} task(s)", report.processed);
                        }
                    }
                    Ok(Err(e)) => log::warn!("Background tick failed: {}", e),
                    Err(e) => log::error!("Background tick panicked: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    ticks
}
