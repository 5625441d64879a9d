//! Stored tool recipe for a work item.

use serde::{Deserialize, Serialize};

/// The raw recipe YAML plus the outcome of validating it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolRecipe {
    pub id: i64,
    pub work_item_id: i64,
    pub yaml: String,
    pub valid: bool,
    /// Validation error; empty when valid
    pub error: String,
}

impl ToolRecipe {
    pub fn status_str(&self) -> &'static str {
        if self.valid { "valid" } else { "invalid" }
    }
}
