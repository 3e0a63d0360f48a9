//! Closed enums shared across the engine.
//!
//! Dispatch on these is exhaustive: adding a context type or requirement kind
//! is a compile error everywhere it is matched. All enums serialize as
//! `snake_case` strings.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The level of context a change or cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// A single task.
    Task,
    /// A subtask under a task.
    Subtask,
    /// A git branch (task tree).
    Branch,
    /// The project as a whole.
    Project,
    /// Global, cross-project context.
    Global,
}

impl ContextType {
    /// Compiled default time-to-live for entries of this type.
    #[must_use]
    pub fn default_ttl(self) -> Duration {
        let secs = match self {
            Self::Task => 900,
            Self::Subtask => 600,
            Self::Branch => 1800,
            Self::Project => 3600,
            Self::Global => 7200,
        };
        Duration::from_secs(secs)
    }

    /// Stable lowercase label used in cache keys and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Subtask => "subtask",
            Self::Branch => "branch",
            Self::Project => "project",
            Self::Global => "global",
        }
    }

    /// Parse a lowercase label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "task" => Some(Self::Task),
            "subtask" => Some(Self::Subtask),
            "branch" => Some(Self::Branch),
            "project" => Some(Self::Project),
            "global" => Some(Self::Global),
            _ => None,
        }
    }

    /// All variants.
    #[must_use]
    pub fn all() -> &'static [ContextType] {
        &[
            Self::Task,
            Self::Subtask,
            Self::Branch,
            Self::Project,
            Self::Global,
        ]
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a change does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    /// Entity was created.
    Create,
    /// Entity fields were updated.
    Update,
    /// Entity was removed.
    Delete,
    /// Entity was synchronized with an outside source (e.g. a git push).
    Sync,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Sync => write!(f, "sync"),
        }
    }
}

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// Produced before a tool ran.
    PreHook,
    /// Produced by classifying a completed tool call.
    PostHook,
    /// Submitted directly by a caller.
    Direct,
    /// Synthesized by merging a conflict group.
    ConflictResolver,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreHook => write!(f, "pre_hook"),
            Self::PostHook => write!(f, "post_hook"),
            Self::Direct => write!(f, "direct"),
            Self::ConflictResolver => write!(f, "conflict_resolver"),
        }
    }
}

/// Urgency of a context requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Nice to have.
    Low,
    /// Default.
    #[default]
    Medium,
    /// Needed for the operation to make sense.
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Which fetch routine a requirement dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// Task-management tool call (task, subtask, branch context).
    McpOperation,
    /// File read or edit (documentation lookup).
    FileOperation,
    /// Git command (branch and project status).
    GitOperation,
    /// Code search (related-entity search).
    SearchOperation,
}

impl RequirementKind {
    /// Context type whose TTL governs cached query results of this kind.
    #[must_use]
    pub fn ttl_context_type(self) -> ContextType {
        match self {
            Self::McpOperation => ContextType::Task,
            Self::FileOperation => ContextType::Project,
            Self::GitOperation => ContextType::Branch,
            Self::SearchOperation => ContextType::Subtask,
        }
    }

    /// Stable label used in cache keys and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::McpOperation => "mcp",
            Self::FileOperation => "file",
            Self::GitOperation => "git",
            Self::SearchOperation => "search",
        }
    }
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a conflict set is reduced to the change that gets applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Keep the change with the greatest timestamp.
    #[default]
    LatestWins,
    /// Keep the change with the greatest `(priority, timestamp)`.
    PriorityBased,
    /// Union disjoint field sets; fall back to `LatestWins` on collision.
    MergeCompatible,
    /// Logged for review, applied as `LatestWins`.
    ManualReview,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestWins => write!(f, "latest_wins"),
            Self::PriorityBased => write!(f, "priority_based"),
            Self::MergeCompatible => write!(f, "merge_compatible"),
            Self::ManualReview => write!(f, "manual_review"),
        }
    }
}
