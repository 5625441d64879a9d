//! Append-only execution records attached to a run: steps, artifacts, summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlaneError;

/// One structured step event within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStep {
    pub id: i64,
    pub run_id: i64,
    /// 0-based position within the run
    pub idx: i64,
    pub name: String,
    pub status: StepStatus,
    pub duration_seconds: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Succeeded,
    Failed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Error => "error",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(StepStatus::Running),
            "succeeded" => Ok(StepStatus::Succeeded),
            "failed" => Ok(StepStatus::Failed),
            "error" => Ok(StepStatus::Error),
            other => Err(PlaneError::InvalidInput(format!("unknown step status: {}", other))),
        }
    }
}

/// Input for recording a new step.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStep {
    pub name: String,
    pub status: StepStatus,
    pub duration_seconds: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl NewStep {
    pub fn new(name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            name: name.into(),
            status,
            duration_seconds: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(at);
        self
    }

    pub fn duration_seconds(mut self, secs: f64) -> Self {
        self.duration_seconds = Some(secs);
        self
    }

    /// Explicit duration, else inferred from start/finish when both are known.
    pub fn effective_duration(&self) -> Option<f64> {
        self.duration_seconds.or_else(|| match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        })
    }
}

/// Partial update of a step; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepUpdate {
    pub status: Option<StepStatus>,
    pub duration_seconds: Option<f64>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A binary/blob output of a run, kept base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunArtifact {
    pub id: i64,
    pub run_id: i64,
    pub name: String,
    pub media_type: Option<String>,
    pub kind: String,
    pub size_bytes: i64,
    pub content_base64: String,
}

/// A structured result document attached to a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub id: i64,
    pub run_id: i64,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub data: serde_json::Value,
}

impl RunSummary {
    /// Pull `title` and `tags` (or `labels`) out of a summary document.
    pub fn extract_metadata(data: &serde_json::Value) -> (Option<String>, Option<Vec<String>>) {
        let title = data.get("title").and_then(|t| t.as_str()).map(str::to_string);
        let tags = data
            .get("tags")
            .filter(|t| !t.is_null())
            .or_else(|| data.get("labels"))
            .and_then(|t| t.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|x| x.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .filter(|tags| !tags.is_empty());
        (title, tags)
    }
}
