//! Run record: one execution attempt of a work item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlaneError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Run {
    pub id: i64,
    pub work_item_id: i64,
    pub status: RunStatus,
    pub logs: String,
    pub trace_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    //=== Lease ===
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    /// Fencing token; incremented whenever a different agent takes the lease
    pub lease_epoch: i64,

    /// Optimistic-lock counter, bumped on every write
    pub version: i64,
}

impl Run {
    /// The token an agent must present to act as the current lease holder.
    pub fn lease_token(&self) -> Option<LeaseToken> {
        self.claimed_by.as_ref().map(|agent| LeaseToken {
            agent_id: agent.clone(),
            epoch: self.lease_epoch,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    /// Returns true once the run has an outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(PlaneError::Storage(format!("unknown run status: {}", other))),
        }
    }
}

/// Proof of lease ownership: the holder's id and the epoch it was granted at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LeaseToken {
    pub agent_id: String,
    pub epoch: i64,
}

impl LeaseToken {
    pub fn new(agent_id: impl Into<String>, epoch: i64) -> Self {
        Self {
            agent_id: agent_id.into(),
            epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("cancelled".parse::<RunStatus>().is_err());
        assert_eq!("failed".parse::<RunStatus>().unwrap(), RunStatus::Failed);
    }
}
