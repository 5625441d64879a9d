//! Domain types for Runplane
//!
//! This module contains the records the control plane persists:
//! - Project / WorkItem: the backlog and its lifecycle states
//! - ApprovalRequest: external sign-off gating a work item
//! - ScheduledTask: queue entries with priority, dependency and delay
//! - Run: execution attempts, including the lease fields
//! - UsageQuota: per-project daily run budget
//! - InfoRequest: mid-run requests for externally supplied values
//! - RunStep / RunArtifact / RunSummary: append-only run observability
//! - ToolRecipe: the recipe YAML attached to a work item
//! - Vision / RequirementsDraft: project intent and the requirements proposed from it

pub mod approval;
pub mod info_request;
pub mod observability;
pub mod project;
pub mod quota;
pub mod run;
pub mod task;
pub mod tool_recipe;
pub mod vision;
pub mod work_item;

pub use approval::{ApprovalRequest, ApprovalStatus};
pub use info_request::{InfoRequest, InfoRequestStatus};
pub use observability::{NewStep, RunArtifact, RunStep, RunSummary, StepStatus, StepUpdate};
pub use project::Project;
pub use quota::{QuotaDecision, Remaining, UsageQuota};
pub use run::{LeaseToken, Run, RunStatus};
pub use task::{ScheduledTask, TaskStatus};
pub use tool_recipe::ToolRecipe;
pub use vision::{DraftStatus, RequirementsDraft, Vision};
pub use work_item::{PolicyUpdate, WorkItem, WorkItemState};
