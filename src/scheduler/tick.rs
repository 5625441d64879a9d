//! One pass of the scheduling algorithm over the queue.

use chrono::{DateTime, Utc};

use super::gates::{self, GateOutcome, SkipReason};
use crate::config::SchedulerConfig;
use crate::domain::{Run, TaskStatus};
use crate::error::Result;
use crate::lifecycle;
use crate::store::{Store, tasks};

/// What a tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks promoted to running
    pub processed: usize,
    /// Runs started, in promotion order
    pub started: Vec<(i64, Run)>,
    /// Tasks left queued, with the first gate that stopped them
    pub skipped: Vec<(i64, SkipReason)>,
}

enum Step {
    Started(Run),
    Skipped(SkipReason),
}

/// Promote every due, eligible queued task to a running run.
///
/// Candidates are taken in priority-desc, id-asc order. Each one is handled
/// in its own transaction that re-reads the task, so concurrent ticks cannot
/// start the same task twice and a failure on one task leaves the others'
/// committed work intact. Gate failures leave the task queued, except for
/// tasks of Done work items, which are retired.
pub fn tick(store: &Store, config: &SchedulerConfig, now: DateTime<Utc>) -> Result<TickReport> {
    let candidates = store.read(|conn| tasks::due_candidates(conn, now))?;
    let mut report = TickReport::default();

    for candidate in candidates {
        let task_id = candidate.id;
        let step = store.write_with_retry(config.conflict_retries, |tx| {
            let Some(task) = tasks::get(tx, task_id)? else {
                return Ok(Step::Skipped(SkipReason::Stale));
            };
            if !task.is_due(now) {
                return Ok(Step::Skipped(SkipReason::Stale));
            }

            match gates::evaluate(tx, &task, config.require_approval, now)? {
                GateOutcome::Skip(SkipReason::Done) => {
                    tasks::transition(tx, &task, TaskStatus::Done)?;
                    Ok(Step::Skipped(SkipReason::Done))
                }
                GateOutcome::Skip(reason) => Ok(Step::Skipped(reason)),
                GateOutcome::Pass(item) => {
                    let run = lifecycle::start_run_in(tx, &item, now)?;
                    tasks::transition(tx, &task, TaskStatus::Running)?;
                    Ok(Step::Started(run))
                }
            }
        });

        match step {
            Ok(Step::Started(run)) => {
                tracing::info!(task_id, run_id = run.id, work_item_id = run.work_item_id, "Task promoted");
                report.processed += 1;
                report.started.push((task_id, run));
            }
            Ok(Step::Skipped(reason)) => {
                if reason == SkipReason::MissingWorkItem {
                    tracing::warn!(task_id, "Queued task references a missing work item");
                } else {
                    tracing::debug!(task_id, reason = %reason, "Task skipped");
                }
                report.skipped.push((task_id, reason));
            }
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Task left queued after store failure");
                report.skipped.push((task_id, SkipReason::Error(e.to_string())));
            }
        }
    }

    if report.processed > 0 || !report.skipped.is_empty() {
        log::info!(
            "Tick processed {} task(s), skipped {}",
            report.processed,
            report.skipped.len()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkItemState;
    use crate::scheduler::queue::{EnqueueRequest, enqueue};
    use crate::store::{projects, runs, work_items};
    use chrono::Duration;

    fn open_config() -> SchedulerConfig {
        SchedulerConfig {
            require_approval: false,
            ..Default::default()
        }
    }

    fn setup(titles: &[&str]) -> (Store, Vec<i64>) {
        let store = Store::open_in_memory().unwrap();
        let ids = store
            .write(|tx| {
                let p = projects::insert(tx, "alpha", None)?;
                titles
                    .iter()
                    .map(|t| work_items::insert(tx, p.id, t, None).map(|wi| wi.id))
                    .collect::<Result<Vec<_>>>()
            })
            .unwrap();
        (store, ids)
    }

    #[test]
    fn test_higher_priority_first_then_insertion_order() {
        let (store, ids) = setup(&["a", "b", "c"]);
        let now = Utc::now();
        store.write(|tx| enqueue(tx, &EnqueueRequest::new(ids[0]), now)).unwrap();
        store.write(|tx| enqueue(tx, &EnqueueRequest::new(ids[1]).priority(10), now)).unwrap();
        store.write(|tx| enqueue(tx, &EnqueueRequest::new(ids[2]), now)).unwrap();

        let report = tick(&store, &open_config(), now).unwrap();
        let order: Vec<i64> = report.started.iter().map(|(_, run)| run.work_item_id).collect();
        assert_eq!(order, vec![ids[1], ids[0], ids[2]]);
        assert_eq!(report.processed, 3);
    }

    #[test]
    fn test_delayed_task_not_due() {
        let (store, ids) = setup(&["a"]);
        let now = Utc::now();
        store
            .write(|tx| enqueue(tx, &EnqueueRequest::new(ids[0]).delay_seconds(60), now))
            .unwrap();

        assert_eq!(tick(&store, &open_config(), now).unwrap().processed, 0);
        assert_eq!(
            tick(&store, &open_config(), now + Duration::seconds(60)).unwrap().processed,
            1
        );
    }

    #[test]
    fn test_second_tick_does_not_restart() {
        let (store, ids) = setup(&["a"]);
        let now = Utc::now();
        store.write(|tx| enqueue(tx, &EnqueueRequest::new(ids[0]), now)).unwrap();

        assert_eq!(tick(&store, &open_config(), now).unwrap().processed, 1);
        assert_eq!(tick(&store, &open_config(), now).unwrap().processed, 0);
        assert_eq!(store.read(|conn| runs::list_for_work_item(conn, ids[0])).unwrap().len(), 1);
    }

    #[test]
    fn test_approval_gate_keeps_task_queued() {
        let (store, ids) = setup(&["a"]);
        let now = Utc::now();
        let task = store.write(|tx| enqueue(tx, &EnqueueRequest::new(ids[0]), now)).unwrap();

        let report = tick(&store, &SchedulerConfig::default(), now).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, vec![(task.id, SkipReason::Approval)]);

        let task = store.read(|conn| tasks::get(conn, task.id)).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
    }

    #[test]
    fn test_busy_work_item_skipped() {
        let (store, ids) = setup(&["a"]);
        let now = Utc::now();
        store.write(|tx| enqueue(tx, &EnqueueRequest::new(ids[0]), now)).unwrap();
        store.write(|tx| enqueue(tx, &EnqueueRequest::new(ids[0]), now)).unwrap();

        let report = tick(&store, &open_config(), now).unwrap();
        assert_eq!(report.processed, 1);
        assert!(matches!(report.skipped[0].1, SkipReason::Busy { .. }));

        let item = store.read(|conn| work_items::require(conn, ids[0])).unwrap();
        assert_eq!(item.state, WorkItemState::InProgress);
    }

    #[test]
    fn test_done_item_task_is_retired() {
        let (store, ids) = setup(&["a"]);
        let now = Utc::now();
        let task = store.write(|tx| enqueue(tx, &EnqueueRequest::new(ids[0]), now)).unwrap();
        store
            .write(|tx| work_items::set_state(tx, ids[0], WorkItemState::Done))
            .unwrap();

        let report = tick(&store, &open_config(), now).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, vec![(task.id, SkipReason::Done)]);

        let task = store.read(|conn| tasks::get(conn, task.id)).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert!(store.read(|conn| runs::list_for_work_item(conn, ids[0])).unwrap().is_empty());
    }
}
