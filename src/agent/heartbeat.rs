//! Background heartbeat for one claimed run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::blocking;
use crate::domain::LeaseToken;
use crate::service::ControlPlane;

/// Keeps a lease alive until stopped or until the lease is lost.
///
/// Losing the lease does not stop local work; callers check
/// [`HeartbeatKeeper::lease_lost`] between steps.
pub struct HeartbeatKeeper {
    run_id: i64,
    stop_tx: watch::Sender<bool>,
    lost_rx: watch::Receiver<bool>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatKeeper {
    pub fn spawn(plane: Arc<ControlPlane>, run_id: i64, token: LeaseToken, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (lost_tx, lost_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let beat = token.clone();
                        let sent = blocking(&plane, move |plane| {
                            plane.heartbeat_run(run_id, &beat.agent_id, Some(&beat))
                        })
                        .await;
                        match sent {
                            Ok(true) => log::debug!("Heartbeat sent for run {}", run_id),
                            Ok(false) => {
                                log::warn!("Lease on run {} lost by {}", run_id, token.agent_id);
                                let _ = lost_tx.send(true);
                                break;
                            }
                            Err(e) => log::warn!("Heartbeat for run {} failed: {}", run_id, e),
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            run_id,
            stop_tx,
            lost_rx,
            handle: Some(handle),
        }
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Whether a heartbeat was rejected because another agent holds the lease.
    pub fn lease_lost(&self) -> bool {
        *self.lost_rx.borrow()
    }

    /// Stop heartbeating and wait for the task to exit.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            log::error!("Heartbeat task for run {} failed: {}", self.run_id, e);
        }
    }
}

impl Drop for HeartbeatKeeper {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
