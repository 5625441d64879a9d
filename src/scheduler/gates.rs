//! Eligibility gates applied to each tick candidate, in order.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::fmt;

use crate::domain::{ApprovalStatus, ScheduledTask, WorkItem, WorkItemState};
use crate::error::Result;
use crate::quota;
use crate::store::{approvals, runs, work_items};

/// Why a candidate stayed queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The dependency work item is not Done
    Dependency { depends_on: i64 },
    /// The task's work item no longer exists
    MissingWorkItem,
    /// The work item is already Done; the task is retired
    Done,
    /// Approval required and the latest request is not approved
    Approval,
    /// The work item already has a running run
    Busy { run_id: i64 },
    /// The project's daily budget is spent
    Quota,
    /// The task changed or left the queue since it was listed
    Stale,
    /// The transaction kept conflicting or failed outright
    Error(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Dependency { depends_on } => write!(f, "waiting on work item {}", depends_on),
            SkipReason::MissingWorkItem => write!(f, "work item missing"),
            SkipReason::Done => write!(f, "work item already done"),
            SkipReason::Approval => write!(f, "approval required"),
            SkipReason::Busy { run_id } => write!(f, "run {} still running", run_id),
            SkipReason::Quota => write!(f, "quota exhausted"),
            SkipReason::Stale => write!(f, "task no longer queued"),
            SkipReason::Error(e) => write!(f, "error: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Pass(WorkItem),
    Skip(SkipReason),
}

/// Run the dependency, existence, done, approval, busy and quota gates in order.
///
/// Only the quota gate writes, and only when every earlier gate passed.
pub fn evaluate(
    conn: &Connection,
    task: &ScheduledTask,
    require_approval: bool,
    now: DateTime<Utc>,
) -> Result<GateOutcome> {
    if let Some(dep) = task.depends_on_work_item_id {
        let satisfied = work_items::get(conn, dep)?.is_some_and(|wi| wi.state == WorkItemState::Done);
        if !satisfied {
            return Ok(GateOutcome::Skip(SkipReason::Dependency { depends_on: dep }));
        }
    }

    let Some(item) = work_items::get(conn, task.work_item_id)? else {
        return Ok(GateOutcome::Skip(SkipReason::MissingWorkItem));
    };

    if item.state == WorkItemState::Done {
        return Ok(GateOutcome::Skip(SkipReason::Done));
    }

    if require_approval {
        let approved = approvals::latest_for(conn, item.id)?.is_some_and(|a| a.status == ApprovalStatus::Approved);
        if !approved {
            return Ok(GateOutcome::Skip(SkipReason::Approval));
        }
    }

    if let Some(run) = runs::latest_running_for(conn, item.id)? {
        return Ok(GateOutcome::Skip(SkipReason::Busy { run_id: run.id }));
    }

    if !quota::try_consume(conn, item.project_id, now)?.allowed {
        return Ok(GateOutcome::Skip(SkipReason::Quota));
    }

    Ok(GateOutcome::Pass(item))
}
