//! Queue operations: enqueue, list, cancel, requeue.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::config::SchedulerConfig;
use crate::domain::{ScheduledTask, TaskStatus};
use crate::error::{PlaneError, Result};
use crate::retry::RetryPolicy;
use crate::store::{runs, tasks, work_items};

/// Parameters for a new queue entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueRequest {
    pub work_item_id: i64,
    pub depends_on_work_item_id: Option<i64>,
    pub priority: i64,
    pub delay_seconds: u64,
}

impl EnqueueRequest {
    pub fn new(work_item_id: i64) -> Self {
        Self {
            work_item_id,
            ..Default::default()
        }
    }

    pub fn depends_on(mut self, work_item_id: i64) -> Self {
        self.depends_on_work_item_id = Some(work_item_id);
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn delay_seconds(mut self, delay_seconds: u64) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(i64::MAX as u64 / 1000) as i64)
}

pub fn enqueue(conn: &Connection, req: &EnqueueRequest, now: DateTime<Utc>) -> Result<ScheduledTask> {
    work_items::require(conn, req.work_item_id)?;
    if let Some(dep) = req.depends_on_work_item_id {
        work_items::require(conn, dep)?;
        if dep == req.work_item_id {
            return Err(PlaneError::InvalidInput(format!(
                "work item {} cannot depend on itself",
                dep
            )));
        }
    }

    let task = tasks::insert(
        conn,
        req.work_item_id,
        req.priority,
        req.depends_on_work_item_id,
        now + seconds(req.delay_seconds),
    )?;
    log::info!(
        "Enqueued task {} for work item {} (priority {}, due {})",
        task.id,
        task.work_item_id,
        task.priority,
        task.scheduled_for
    );
    Ok(task)
}

/// Explicitly cancel a queued task by marking it done.
pub fn cancel(conn: &Connection, task_id: i64) -> Result<ScheduledTask> {
    let task = tasks::get(conn, task_id)?.ok_or(PlaneError::not_found("scheduled task", task_id))?;
    if task.status != TaskStatus::Queued {
        return Err(PlaneError::precondition(format!(
            "scheduled task {} is {}, only queued tasks can be cancelled",
            task_id, task.status
        )));
    }
    let task = tasks::transition(conn, &task, TaskStatus::Done)?;
    log::info!("Cancelled task {}", task_id);
    Ok(task)
}

/// Options for re-enqueueing a run's work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequeueRequest {
    pub priority: i64,
    pub delay_seconds: u64,
    /// Derive the delay from the failure count instead of `delay_seconds`
    pub backoff: bool,
}

/// Enqueue the run's work item again. With `backoff` the delay is
/// `base * 2^failures`, using the item's effective base.
pub fn requeue_run(
    conn: &Connection,
    run_id: i64,
    req: &RequeueRequest,
    defaults: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Result<ScheduledTask> {
    let run = runs::require(conn, run_id)?;
    let item = work_items::require(conn, run.work_item_id)?;

    let delay = if req.backoff {
        let failures = runs::count_failed(conn, item.id)?;
        RetryPolicy::effective(defaults, &item).base_delay(failures)
    } else {
        seconds(req.delay_seconds)
    };

    let task = tasks::insert(conn, item.id, req.priority, None, now + delay)?;
    log::info!(
        "Requeued run {} as task {} for work item {} (delay {}s)",
        run_id,
        task.id,
        item.id,
        delay.num_seconds()
    );
    Ok(task)
}
