//! Relevance detection for operations about to run.
//!
//! A static table maps tool names to one trigger rule each. Tools absent from
//! the table are never relevant, so an unrecognised operation costs nothing.

use ctxsync_core::{ContextRequirement, Priority, RequirementKind, RequirementTargets};
use serde_json::Value;
use tracing::trace;

/// How a rule decides that a call needs context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Parameter value is one of these (case-insensitive exact match).
    Actions(&'static [&'static str]),
    /// Path parameter ends with one of these extensions.
    Extensions(&'static [&'static str]),
    /// Glob parameter contains one of these extensions.
    GlobExtensions(&'static [&'static str]),
    /// Command parameter contains one of these substrings (case-insensitive).
    CommandSubstrings(&'static [&'static str]),
    /// Free-text parameter contains one of these substrings (case-insensitive).
    TextPatterns(&'static [&'static str]),
}

/// One row of the detection table.
#[derive(Clone, Copy, Debug)]
pub struct DetectionRule {
    /// Tool name, matched exactly.
    pub tool: &'static str,
    /// Parameter inspected by the trigger.
    pub param: &'static str,
    /// Trigger condition.
    pub trigger: Trigger,
    /// Kind of requirement produced.
    pub kind: RequirementKind,
    /// Priority of the produced requirement.
    pub priority: Priority,
}

const TASK_ACTIONS: &[&str] = &["get", "update", "complete", "next", "start"];
const SUBTASK_ACTIONS: &[&str] = &["get", "update", "complete", "list"];
const CONTEXT_ACTIONS: &[&str] = &["get", "resolve"];
const DOC_EXTENSIONS: &[&str] = &[
    ".md", ".rst", ".txt", ".rs", ".py", ".ts", ".tsx", ".js", ".go", ".toml", ".yaml", ".yml",
    ".json",
];
const GIT_COMMANDS: &[&str] = &[
    "git status",
    "git commit",
    "git checkout",
    "git switch",
    "git merge",
    "git rebase",
    "git push",
    "git branch",
];
const SEARCH_PATTERNS: &[&str] = &["todo", "fixme", "task", "bug", "issue", "hack"];

/// Built-in detection table.
pub const DEFAULT_RULES: &[DetectionRule] = &[
    DetectionRule {
        tool: "manage_task",
        param: "action",
        trigger: Trigger::Actions(TASK_ACTIONS),
        kind: RequirementKind::McpOperation,
        priority: Priority::High,
    },
    DetectionRule {
        tool: "manage_subtask",
        param: "action",
        trigger: Trigger::Actions(SUBTASK_ACTIONS),
        kind: RequirementKind::McpOperation,
        priority: Priority::Medium,
    },
    DetectionRule {
        tool: "manage_context",
        param: "action",
        trigger: Trigger::Actions(CONTEXT_ACTIONS),
        kind: RequirementKind::McpOperation,
        priority: Priority::Medium,
    },
    DetectionRule {
        tool: "Read",
        param: "file_path",
        trigger: Trigger::Extensions(DOC_EXTENSIONS),
        kind: RequirementKind::FileOperation,
        priority: Priority::Low,
    },
    DetectionRule {
        tool: "Edit",
        param: "file_path",
        trigger: Trigger::Extensions(DOC_EXTENSIONS),
        kind: RequirementKind::FileOperation,
        priority: Priority::Medium,
    },
    DetectionRule {
        tool: "MultiEdit",
        param: "file_path",
        trigger: Trigger::Extensions(DOC_EXTENSIONS),
        kind: RequirementKind::FileOperation,
        priority: Priority::Medium,
    },
    DetectionRule {
        tool: "Write",
        param: "file_path",
        trigger: Trigger::Extensions(DOC_EXTENSIONS),
        kind: RequirementKind::FileOperation,
        priority: Priority::Medium,
    },
    DetectionRule {
        tool: "Glob",
        param: "pattern",
        trigger: Trigger::GlobExtensions(DOC_EXTENSIONS),
        kind: RequirementKind::FileOperation,
        priority: Priority::Low,
    },
    DetectionRule {
        tool: "Bash",
        param: "command",
        trigger: Trigger::CommandSubstrings(GIT_COMMANDS),
        kind: RequirementKind::GitOperation,
        priority: Priority::Medium,
    },
    DetectionRule {
        tool: "Grep",
        param: "pattern",
        trigger: Trigger::TextPatterns(SEARCH_PATTERNS),
        kind: RequirementKind::SearchOperation,
        priority: Priority::Low,
    },
];

/// Outcome of relevance detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Relevance {
    /// No context needed.
    NotRelevant,
    /// Context described by the requirement is needed.
    Relevant(ContextRequirement),
}

impl Relevance {
    /// Whether context is needed.
    pub fn is_relevant(&self) -> bool {
        matches!(self, Self::Relevant(_))
    }

    /// Priority of the requirement, if relevant.
    pub fn priority(&self) -> Option<Priority> {
        match self {
            Self::Relevant(req) => Some(req.priority),
            Self::NotRelevant => None,
        }
    }

    /// The requirement, if relevant.
    pub fn into_requirement(self) -> Option<ContextRequirement> {
        match self {
            Self::Relevant(req) => Some(req),
            Self::NotRelevant => None,
        }
    }
}

/// Table-driven relevance detector.
#[derive(Clone, Debug)]
pub struct RelevanceDetector {
    rules: &'static [DetectionRule],
}

impl Default for RelevanceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_RULES)
    }
}

impl RelevanceDetector {
    /// Detector over a fixed table.
    pub fn new(rules: &'static [DetectionRule]) -> Self {
        Self { rules }
    }

    /// Rule for `tool`, if any.
    pub fn rule_for(&self, tool: &str) -> Option<&DetectionRule> {
        self.rules.iter().find(|r| r.tool == tool)
    }

    /// Whether `tool` called with `params` needs context.
    pub fn is_relevant(&self, tool: &str, params: &Value) -> bool {
        self.detect(tool, params).is_relevant()
    }

    /// Classify an upcoming call.
    pub fn detect(&self, tool: &str, params: &Value) -> Relevance {
        let Some(rule) = self.rule_for(tool) else {
            trace!(tool, "no detection rule");
            return Relevance::NotRelevant;
        };
        let Some(value) = str_param(params, rule.param) else {
            trace!(tool, param = rule.param, "trigger parameter missing");
            return Relevance::NotRelevant;
        };
        if !trigger_matches(rule.trigger, value) {
            trace!(tool, "trigger did not match");
            return Relevance::NotRelevant;
        }
        Relevance::Relevant(ContextRequirement::new(
            rule.kind,
            extract_targets(params),
            rule.priority,
        ))
    }
}

fn trigger_matches(trigger: Trigger, value: &str) -> bool {
    let lower = value.to_lowercase();
    match trigger {
        Trigger::Actions(allowed) => allowed.iter().any(|a| lower == *a),
        Trigger::Extensions(exts) => exts.iter().any(|ext| lower.ends_with(ext)),
        Trigger::GlobExtensions(exts) => exts.iter().any(|ext| lower.contains(ext)),
        Trigger::CommandSubstrings(needles) | Trigger::TextPatterns(needles) => {
            needles.iter().any(|n| lower.contains(n))
        }
    }
}

fn str_param<'a>(params: &'a Value, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn first_param(params: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|n| str_param(params, n)).map(str::to_string)
}

/// Identifiers named by the call parameters.
pub fn extract_targets(params: &Value) -> RequirementTargets {
    RequirementTargets {
        task_id: first_param(params, &["task_id", "parent_task_id"]),
        subtask_id: first_param(params, &["subtask_id"]),
        branch_id: first_param(params, &["branch_id", "git_branch_id"]),
        file_path: first_param(params, &["file_path", "path"]),
        pattern: first_param(params, &["pattern", "query"]),
        command: first_param(params, &["command"]),
        action: first_param(params, &["action"]),
    }
}
