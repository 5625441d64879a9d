//! Project record

use serde::{Deserialize, Serialize};

/// A named container of work items with its own usage quota.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    /// Unique across the store
    pub name: String,
    pub description: Option<String>,
}
