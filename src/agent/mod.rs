//! Agent side of the lease protocol.
//!
//! An agent polls for running runs, claims one, keeps the lease alive with a
//! [`HeartbeatKeeper`], pauses on info requests for missing inputs, executes
//! the recipe steps through a [`StepExecutor`] and completes the run with its
//! lease token.

mod executor;
mod heartbeat;
mod worker;

pub use executor::{ShellExecutor, StepExecutor, StepOutput};
pub use heartbeat::HeartbeatKeeper;
pub use worker::{Agent, RunOutcome, RunReport};

use std::sync::Arc;

use crate::error::{PlaneError, Result};
use crate::service::ControlPlane;

/// Run a synchronous plane call on the blocking pool.
///
/// Store calls hold the connection mutex and may sit in the SQLite busy
/// timeout, so agents never make them on a runtime worker thread.
pub(crate) async fn blocking<T, F>(plane: &Arc<ControlPlane>, f: F) -> Result<T>
where
    F: FnOnce(&ControlPlane) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let plane = plane.clone();
    tokio::task::spawn_blocking(move || f(&plane))
        .await
        .map_err(|e| PlaneError::Storage(format!("store call aborted: {}", e)))?
}
