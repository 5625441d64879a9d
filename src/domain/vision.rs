//! Project vision and the requirements draft proposed from it

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlaneError;

/// Free-form statement of what a project is for. A project may have many;
/// the most recent one drives proposals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vision {
    pub id: i64,
    pub project_id: i64,
    pub content: String,
}

/// Requirements proposed from a vision. At most one per vision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequirementsDraft {
    pub id: i64,
    pub vision_id: i64,
    pub draft: String,
    pub status: DraftStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Proposed,
    Approved,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Proposed => "proposed",
            DraftStatus::Approved => "approved",
        }
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DraftStatus {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(DraftStatus::Proposed),
            "approved" => Ok(DraftStatus::Approved),
            other => Err(PlaneError::Storage(format!("unknown draft status: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_status_parse() {
        assert_eq!("approved".parse::<DraftStatus>().unwrap(), DraftStatus::Approved);
        assert!("final".parse::<DraftStatus>().is_err());
    }
}
