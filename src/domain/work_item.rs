//! Work item record and its lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlaneError;

/// A unit of work tracked through a fixed set of states.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub state: WorkItemState,
    /// Per-item overrides of the global retry policy
    pub max_retries: Option<u32>,
    pub backoff_base_seconds: Option<u64>,
    pub backoff_jitter_seconds: Option<u64>,
}

/// Lifecycle: Proposed -> Approved -> InProgress -> Review -> Done.
///
/// A failed run leaves the item in Review; a re-run moves it back to InProgress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkItemState {
    Proposed,
    Approved,
    InProgress,
    Review,
    Done,
}

impl WorkItemState {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemState::Proposed => "Proposed",
            WorkItemState::Approved => "Approved",
            WorkItemState::InProgress => "In Progress",
            WorkItemState::Review => "Review",
            WorkItemState::Done => "Done",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            WorkItemState::Proposed => 0,
            WorkItemState::Approved => 1,
            WorkItemState::InProgress => 2,
            WorkItemState::Review => 3,
            WorkItemState::Done => 4,
        }
    }

    /// Whether an explicit transition from `self` to `next` is allowed.
    ///
    /// Moves are forward-only, with the single exception of Review -> InProgress.
    pub fn can_transition_to(&self, next: WorkItemState) -> bool {
        if *self == WorkItemState::Review && next == WorkItemState::InProgress {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkItemState {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-'], " ").as_str() {
            "proposed" => Ok(WorkItemState::Proposed),
            "approved" => Ok(WorkItemState::Approved),
            "in progress" | "inprogress" => Ok(WorkItemState::InProgress),
            "review" => Ok(WorkItemState::Review),
            "done" => Ok(WorkItemState::Done),
            other => Err(PlaneError::InvalidInput(format!("unknown work item state: {}", other))),
        }
    }
}

/// Partial update of a work item's retry overrides; `None` leaves a field untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyUpdate {
    pub max_retries: Option<u32>,
    pub backoff_base_seconds: Option<u64>,
    pub backoff_jitter_seconds: Option<u64>,
}
