//! Scheduler queue and tick.
//!
//! - **queue**: enqueue, cancel and requeue of scheduled tasks
//! - **gates**: dependency, approval, busy and quota checks per candidate
//! - **tick**: promotes due, eligible tasks into running runs
//! - **driver**: background loop calling tick on an interval

mod driver;
mod gates;
mod queue;
mod tick;

pub use driver::TickDriver;
pub use gates::{GateOutcome, SkipReason, evaluate as evaluate_gates};
pub use queue::{EnqueueRequest, RequeueRequest, cancel, enqueue, requeue_run};
pub use tick::{TickReport, tick};
