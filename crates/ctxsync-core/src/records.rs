//! Records returned by the remote context source.
//!
//! Each record names the fields the formatter renders and keeps everything
//! else the source sent in `extra`, so unknown fields survive caching.

use serde::{Deserialize, Serialize};

use crate::change::Fields;

/// A task as reported by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier.
    pub id: String,
    /// Task title.
    pub title: String,
    /// Workflow status (`todo`, `in_progress`, `done`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Priority label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Branch the task lives on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    /// Any other fields.
    #[serde(flatten)]
    pub extra: Fields,
}

/// A branch (task tree) as reported by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// Branch identifier.
    pub id: String,
    /// Git branch name.
    pub name: String,
    /// Branch status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Number of tasks on the branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_count: Option<u64>,
    /// Any other fields.
    #[serde(flatten)]
    pub extra: Fields,
}

/// The current project as reported by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Project identifier.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Any other fields.
    #[serde(flatten)]
    pub extra: Fields,
}

/// A search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Identifier of the matched entity.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Entity kind (`task`, `document`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Status, when the hit is a task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Location (path or URL), when the hit is a document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Any other fields.
    #[serde(flatten)]
    pub extra: Fields,
}
