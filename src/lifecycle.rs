//! Run start/completion and the work item transitions they drive.
//!
//! These functions run inside the caller's transaction so the tick can start
//! a run and flip its task atomically, and completion can enqueue the retry
//! in the same commit as the failure.

use chrono::{DateTime, Utc};
use log::info;
use rand::Rng;
use rusqlite::Connection;

use crate::config::SchedulerConfig;
use crate::domain::{Run, RunStatus, ScheduledTask, TaskStatus, WorkItem, WorkItemState};
use crate::error::{PlaneError, Result};
use crate::id::generate_trace_id;
use crate::retry::RetryPolicy;
use crate::store::{runs, tasks, work_items};

/// Result of completing a run.
#[derive(Debug, Clone)]
pub struct Completion {
    pub run: Run,
    pub work_item: WorkItem,
    /// Failed runs of the work item, including this one
    pub failure_count: u32,
    /// Retry task enqueued by the backoff policy
    pub retry: Option<ScheduledTask>,
}

/// Create a `running` run with a fresh trace id and move the item to InProgress.
pub fn start_run_in(conn: &Connection, item: &WorkItem, now: DateTime<Utc>) -> Result<Run> {
    if item.state == WorkItemState::Done {
        return Err(PlaneError::precondition(format!("work item {} is already done", item.id)));
    }
    let trace_id = generate_trace_id();
    let logs = format!("Starting run... trace_id={}\n", trace_id);
    let run = runs::insert_running(conn, item.id, &trace_id, &logs, now)?;
    work_items::set_state(conn, item.id, WorkItemState::InProgress)?;

    tracing::info!(run_id = run.id, work_item_id = item.id, trace_id = %trace_id, "Run started");
    Ok(run)
}

/// Finish a running run and apply the retry policy on failure.
pub fn complete_run_in<R: Rng + ?Sized>(
    conn: &Connection,
    run: &Run,
    success: bool,
    now: DateTime<Utc>,
    defaults: &SchedulerConfig,
    rng: &mut R,
) -> Result<Completion> {
    if run.status != RunStatus::Running {
        return Err(PlaneError::precondition(format!(
            "run {} is {}, not running",
            run.id, run.status
        )));
    }

    let mut finished = run.clone();
    finished.status = if success { RunStatus::Succeeded } else { RunStatus::Failed };
    finished.finished_at = Some(now);
    finished
        .logs
        .push_str(if success { "Completed successfully.\n" } else { "Failed.\n" });
    let finished = runs::save(conn, &finished)?;

    let next_state = if success { WorkItemState::Done } else { WorkItemState::Review };
    work_items::set_state(conn, run.work_item_id, next_state)?;
    let work_item = work_items::require(conn, run.work_item_id)?;

    if let Some(task) = tasks::latest_running_for(conn, run.work_item_id)? {
        tasks::transition(conn, &task, TaskStatus::Done)?;
    }

    if success {
        let retired = tasks::retire_queued_for(conn, run.work_item_id)?;
        tracing::info!(
            run_id = run.id,
            work_item_id = run.work_item_id,
            retired_tasks = retired,
            "Run succeeded"
        );
        return Ok(Completion {
            run: finished,
            work_item,
            failure_count: 0,
            retry: None,
        });
    }

    let failure_count = runs::count_failed(conn, run.work_item_id)?;
    let policy = RetryPolicy::effective(defaults, &work_item);
    let retry = match policy.delay_for(failure_count, rng) {
        Some(delay) => {
            let task = tasks::insert(conn, work_item.id, 0, None, now + delay)?;
            info!(
                "Work item {} failed ({}/{}), retry task {} in {}s",
                work_item.id,
                failure_count,
                policy.max_retries,
                task.id,
                delay.num_milliseconds() as f64 / 1000.0
            );
            Some(task)
        }
        None => {
            info!(
                "Work item {} failed {} times, retries exhausted; left in Review",
                work_item.id, failure_count
            );
            None
        }
    };

    Ok(Completion {
        run: finished,
        work_item,
        failure_count,
        retry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, projects};
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup() -> (Store, WorkItem) {
        let store = Store::open_in_memory().unwrap();
        let item = store
            .write(|tx| {
                let project = projects::insert(tx, "alpha", None)?;
                work_items::insert(tx, project.id, "build", None)
            })
            .unwrap();
        (store, item)
    }

    #[test]
    fn test_start_run_sets_in_progress() {
        let (store, item) = setup();
        let now = Utc::now();
        let run = store.write(|tx| start_run_in(tx, &item, now)).unwrap();

        assert_eq!(run.status, RunStatus::Running);
        assert!(run.logs.starts_with("Starting run... trace_id="));
        assert!(run.trace_id.is_some());

        let item = store.read(|conn| work_items::require(conn, item.id)).unwrap();
        assert_eq!(item.state, WorkItemState::InProgress);
    }

    #[test]
    fn test_success_marks_done_without_retry() {
        let (store, item) = setup();
        let now = Utc::now();
        let defaults = SchedulerConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        let run = store.write(|tx| start_run_in(tx, &item, now)).unwrap();
        let done = store
            .write(|tx| complete_run_in(tx, &run, true, now, &defaults, &mut rng))
            .unwrap();

        assert_eq!(done.run.status, RunStatus::Succeeded);
        assert_eq!(done.run.finished_at.map(|t| t.timestamp_millis()), Some(now.timestamp_millis()));
        assert!(done.run.logs.ends_with("Completed successfully.\n"));
        assert_eq!(done.work_item.state, WorkItemState::Done);
        assert!(done.retry.is_none());
    }

    #[test]
    fn test_success_retires_other_queued_tasks() {
        let (store, item) = setup();
        let now = Utc::now();
        let defaults = SchedulerConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        let leftover = store.write(|tx| tasks::insert(tx, item.id, 0, None, now)).unwrap();
        let run = store.write(|tx| start_run_in(tx, &item, now)).unwrap();
        store
            .write(|tx| complete_run_in(tx, &run, true, now, &defaults, &mut rng))
            .unwrap();

        let leftover = store.read(|conn| tasks::get(conn, leftover.id)).unwrap().unwrap();
        assert_eq!(leftover.status, TaskStatus::Done);
    }

    #[test]
    fn test_start_run_rejects_done_item() {
        let (store, item) = setup();
        store
            .write(|tx| work_items::set_state(tx, item.id, WorkItemState::Done))
            .unwrap();
        let item = store.read(|conn| work_items::require(conn, item.id)).unwrap();

        let err = store.write(|tx| start_run_in(tx, &item, Utc::now())).unwrap_err();
        assert!(matches!(err, PlaneError::PreconditionFailed(_)));
    }

    #[test]
    fn test_failure_enqueues_backoff_task() {
        let (store, item) = setup();
        let now = Utc::now();
        let defaults = SchedulerConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        let run = store.write(|tx| start_run_in(tx, &item, now)).unwrap();
        let failed = store
            .write(|tx| complete_run_in(tx, &run, false, now, &defaults, &mut rng))
            .unwrap();

        assert_eq!(failed.work_item.state, WorkItemState::Review);
        assert_eq!(failed.failure_count, 1);
        let retry = failed.retry.unwrap();
        assert_eq!(retry.priority, 0);
        assert_eq!(
            retry.scheduled_for.timestamp_millis(),
            (now + Duration::seconds(30)).timestamp_millis()
        );
    }

    #[test]
    fn test_completing_twice_is_rejected() {
        let (store, item) = setup();
        let now = Utc::now();
        let defaults = SchedulerConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        let run = store.write(|tx| start_run_in(tx, &item, now)).unwrap();
        let done = store
            .write(|tx| complete_run_in(tx, &run, true, now, &defaults, &mut rng))
            .unwrap();
        let err = store
            .write(|tx| complete_run_in(tx, &done.run, false, now, &defaults, &mut rng))
            .unwrap_err();
        assert!(matches!(err, PlaneError::PreconditionFailed(_)));
    }
}
