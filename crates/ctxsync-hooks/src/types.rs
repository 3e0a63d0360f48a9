//! Hook types, results, and per-event contexts.
//!
//! Contexts use `camelCase` serde renaming so hosts can hand them over as
//! JSON.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Point in a tool call's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookType {
    /// Before a tool runs. Forced-blocking.
    PreToolUse,
    /// After a tool ran.
    PostToolUse,
    /// The host is stopping.
    Stop,
}

impl HookType {
    /// Whether handlers of this type always run blocking.
    ///
    /// A `PreToolUse` result can change the call it precedes, so it must be
    /// awaited.
    #[must_use]
    pub fn is_forced_blocking(self) -> bool {
        matches!(self, Self::PreToolUse)
    }

    /// Every variant.
    #[must_use]
    pub fn all() -> &'static [HookType] {
        &[Self::PreToolUse, Self::PostToolUse, Self::Stop]
    }
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreToolUse => write!(f, "PreToolUse"),
            Self::PostToolUse => write!(f, "PostToolUse"),
            Self::Stop => write!(f, "Stop"),
        }
    }
}

/// What a handler asks the host to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookAction {
    /// Proceed unchanged.
    Continue,
    /// Refuse the operation.
    Block,
    /// Proceed with `modifications`.
    Modify,
}

/// Whether the host waits for a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookExecutionMode {
    /// Awaited in priority order.
    #[default]
    Blocking,
    /// Spawned and tracked; the host does not wait.
    Background,
}

/// Handler result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResult {
    /// Requested action.
    pub action: HookAction,
    /// Why, for `Block`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Note for the host's log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Changes to apply, for `Modify`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifications: Option<Value>,
}

impl HookResult {
    /// Proceed unchanged.
    #[must_use]
    pub fn continue_() -> Self {
        Self {
            action: HookAction::Continue,
            reason: None,
            message: None,
            modifications: None,
        }
    }

    /// Proceed unchanged, with a note.
    #[must_use]
    pub fn continue_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::continue_()
        }
    }

    /// Refuse with `reason`.
    #[must_use]
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            action: HookAction::Block,
            reason: Some(reason.into()),
            message: None,
            modifications: None,
        }
    }

    /// Proceed with `modifications`.
    #[must_use]
    pub fn modify(modifications: Value) -> Self {
        Self {
            action: HookAction::Modify,
            reason: None,
            message: None,
            modifications: Some(modifications),
        }
    }

    /// Whether the operation is refused.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.action == HookAction::Block
    }
}

/// Event data handed to handlers, one variant per [`HookType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hookType", rename_all = "camelCase")]
pub enum HookContext {
    /// Before a tool runs.
    #[serde(rename_all = "camelCase")]
    PreToolUse {
        /// Session the call belongs to.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Tool about to run.
        tool_name: String,
        /// Arguments it will receive.
        tool_arguments: Value,
        /// Call identifier.
        tool_call_id: String,
    },
    /// After a tool ran.
    #[serde(rename_all = "camelCase")]
    PostToolUse {
        /// Session the call belongs to.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Tool that ran.
        tool_name: String,
        /// Arguments it received.
        tool_arguments: Value,
        /// Call identifier.
        tool_call_id: String,
        /// Tool result, when the host has one.
        result: Option<Value>,
        /// Wall time of the call.
        duration_ms: u64,
    },
    /// Host stopping.
    #[serde(rename_all = "camelCase")]
    Stop {
        /// Session ending.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Why.
        stop_reason: String,
    },
}

impl HookContext {
    /// [`HookType`] of this context.
    #[must_use]
    pub fn hook_type(&self) -> HookType {
        match self {
            Self::PreToolUse { .. } => HookType::PreToolUse,
            Self::PostToolUse { .. } => HookType::PostToolUse,
            Self::Stop { .. } => HookType::Stop,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::PreToolUse { session_id, .. }
            | Self::PostToolUse { session_id, .. }
            | Self::Stop { session_id, .. } => session_id,
        }
    }

    /// Tool name, for tool events.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::PreToolUse { tool_name, .. } | Self::PostToolUse { tool_name, .. } => {
                Some(tool_name)
            }
            Self::Stop { .. } => None,
        }
    }
}

/// Builds contexts for one session, stamping the current time.
#[derive(Debug, Clone)]
pub struct SessionContexts {
    session_id: String,
}

impl SessionContexts {
    /// Factory for `session_id`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    /// `PreToolUse` context.
    pub fn pre_tool_use(&self, tool_name: &str, arguments: Value, tool_call_id: &str) -> HookContext {
        HookContext::PreToolUse {
            session_id: self.session_id.clone(),
            timestamp: Self::now(),
            tool_name: tool_name.to_string(),
            tool_arguments: arguments,
            tool_call_id: tool_call_id.to_string(),
        }
    }

    /// `PostToolUse` context.
    pub fn post_tool_use(
        &self,
        tool_name: &str,
        arguments: Value,
        tool_call_id: &str,
        result: Option<Value>,
        duration_ms: u64,
    ) -> HookContext {
        HookContext::PostToolUse {
            session_id: self.session_id.clone(),
            timestamp: Self::now(),
            tool_name: tool_name.to_string(),
            tool_arguments: arguments,
            tool_call_id: tool_call_id.to_string(),
            result,
            duration_ms,
        }
    }

    /// `Stop` context.
    pub fn stop(&self, stop_reason: &str) -> HookContext {
        HookContext::Stop {
            session_id: self.session_id.clone(),
            timestamp: Self::now(),
            stop_reason: stop_reason.to_string(),
        }
    }
}

/// Registered handler summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookInfo {
    /// Handler name.
    pub name: String,
    /// Event it handles.
    pub hook_type: HookType,
    /// Higher runs first.
    pub priority: i32,
    /// Declared mode.
    pub execution_mode: HookExecutionMode,
    /// Per-call ceiling, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}
