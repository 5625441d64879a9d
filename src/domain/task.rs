//! Scheduled task record: one queue entry waiting to become a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlaneError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: i64,
    pub work_item_id: i64,
    pub status: TaskStatus,
    /// Higher runs first
    pub priority: i64,
    /// Work item that must be Done before this task is eligible
    pub depends_on_work_item_id: Option<i64>,
    /// Earliest eligible time
    pub scheduled_for: DateTime<Utc>,
    /// Optimistic-lock counter, bumped on every write
    pub version: i64,
}

impl ScheduledTask {
    /// Whether the task is queued and its delay has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Queued && self.scheduled_for <= now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "done" => Ok(TaskStatus::Done),
            other => Err(PlaneError::Storage(format!("unknown task status: {}", other))),
        }
    }
}
