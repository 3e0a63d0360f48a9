//! Engine error types.
//!
//! None of these cross the public entry points (`is_relevant`, `query`,
//! `classify`, `sync`, `add_change`): each is logged and converted to an
//! absent result or a failed [`SyncOutcome`](crate::coordinator::SyncOutcome).

use ctxsync_core::{ChangeId, RequirementKind};

/// Failure reported by the remote context source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Source could not be reached.
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Source refused the request.
    #[error("Source rejected request: {0}")]
    Rejected(String),

    /// Source answered with something that could not be decoded.
    #[error("Malformed source response: {0}")]
    Malformed(String),
}

/// Why a context query produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Fetch exceeded its budget.
    #[error("Query timed out after {timeout_ms}ms ({kind})")]
    Timeout {
        /// Requirement kind being fetched.
        kind: RequirementKind,
        /// Budget that was exceeded.
        timeout_ms: u64,
    },

    /// Remote source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A mandatory identifier could not be resolved.
    #[error("Required {entity} not found: {id}")]
    RequiredMissing {
        /// Entity type (`task`, `branch`, `project`).
        entity: &'static str,
        /// Identifier that was requested.
        id: String,
    },

    /// Fetched records could not be turned into a payload.
    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Blocking adapter could not start its runtime.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl QueryError {
    /// Category label for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Source(_) => "source",
            Self::RequiredMissing { .. } => "required_missing",
            Self::Encode(_) => "encode",
            Self::Runtime(_) => "runtime",
        }
    }
}

/// A single change that could not be staged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// Change names no entity.
    #[error("Change {change_id} has an empty entity id")]
    EmptyEntityId {
        /// Offending change.
        change_id: ChangeId,
    },

    /// Priority outside `1..=5`.
    #[error("Change {change_id} has priority {priority} outside 1..=5")]
    PriorityOutOfRange {
        /// Offending change.
        change_id: ChangeId,
        /// Priority carried.
        priority: u8,
    },
}

/// Synchronization cycle failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Cycle exceeded its deadline and was abandoned.
    #[error("Sync cycle timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// External publisher rejected the batch.
    #[error("Publish failed: {0}")]
    Publish(String),
}
