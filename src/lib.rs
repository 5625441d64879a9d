//! Runplane - a control plane for queued work
//!
//! Runplane keeps a backlog of work items, queues them for execution with
//! priorities, dependencies and delays, and promotes eligible entries into
//! runs on each scheduler tick. Agents claim running runs under a
//! heartbeat-renewed lease, report completion, and may pause for externally
//! supplied values. Failed runs are retried with exponential backoff and
//! every project is held to a daily run quota. Projects may also record a
//! vision and have a requirements draft proposed from it.

pub mod agent;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod id;
pub mod info;
pub mod lease;
pub mod lifecycle;
pub mod planner;
pub mod quota;
pub mod recipe;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod store;

pub use error::{PlaneError, Result};
pub use service::ControlPlane;
