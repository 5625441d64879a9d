//! Requirements proposal from a project vision.
//!
//! A [`RequirementsPlanner`] may be attached to the control plane to write the
//! draft. When none is attached, or it declines, [`fallback_draft`] produces a
//! fixed outline that quotes the start of the vision.

use crate::domain::{Project, Vision};
use crate::error::Result;

/// Characters of the vision quoted in the fallback draft.
pub const VISION_SUMMARY_CHARS: usize = 200;

/// Source of requirements drafts.
pub trait RequirementsPlanner: Send + Sync {
    /// Draft requirements for `vision`. `Ok(None)` falls back to the outline.
    fn propose(&self, project: &Project, vision: &Vision) -> Result<Option<String>>;
}

/// The outline used when no planner produces a draft.
pub fn fallback_draft(project_name: &str, vision: &str) -> String {
    let summary: String = vision.chars().take(VISION_SUMMARY_CHARS).collect();
    format!(
        "Proposed Requirements for project '{}':\n\
         - Goals: derive from vision text.\n\
         - MVP: implement minimal endpoints and CI.\n\
         - Non-Goals: items not in scope.\n\
         Vision Summary: {}",
        project_name, summary
    )
}
