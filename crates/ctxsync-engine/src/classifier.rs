//! Classification of completed operations into context changes.
//!
//! Rules are immutable data compiled once at construction and tried in a
//! fixed order; the first match wins. Rule tool sets are pairwise disjoint,
//! so no call can match two categories. Anything unmatched, and any call
//! whose result reports failure, is [`Classification::Unknown`], which
//! callers treat as a successful no-op.

use ctxsync_core::{ChangeOperation, ChangeSource, ContextChange, ContextType, Fields};
use regex::Regex;
use serde_json::Value;
use tracing::trace;

/// Result of classifying one completed call.
#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    /// The call changed a context entity.
    Change(ContextChange),
    /// Nothing recognisable changed.
    Unknown,
}

impl Classification {
    /// Whether this is the no-op sentinel.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// The change, if any.
    pub fn into_change(self) -> Option<ContextChange> {
        match self {
            Self::Change(change) => Some(change),
            Self::Unknown => None,
        }
    }
}

/// How a rule recognises its calls.
#[derive(Debug)]
enum Matcher {
    /// `action` parameter mapped to an operation.
    Actions(&'static [(&'static str, ChangeOperation)]),
    /// `command` parameter matched by regex; capture 1 is the git verb.
    Command(Regex, ChangeOperation),
    /// `file_path` parameter matched by regex.
    FilePath(Regex, ChangeOperation),
}

/// One classification rule.
#[derive(Debug)]
pub struct ClassificationRule {
    name: &'static str,
    tools: &'static [&'static str],
    matcher: Matcher,
    context_type: ContextType,
    /// Parameter names holding the entity id, tried in order.
    id_params: &'static [&'static str],
    /// Entity id when no parameter names one.
    default_id: Option<&'static str>,
    priority: u8,
    requires_sync: bool,
}

impl ClassificationRule {
    /// Rule name for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Tools this rule covers.
    pub fn tools(&self) -> &'static [&'static str] {
        self.tools
    }
}

const TASK_ACTIONS: &[(&str, ChangeOperation)] = &[
    ("create", ChangeOperation::Create),
    ("update", ChangeOperation::Update),
    ("start", ChangeOperation::Update),
    ("complete", ChangeOperation::Update),
    ("delete", ChangeOperation::Delete),
];
const SUBTASK_ACTIONS: &[(&str, ChangeOperation)] = &[
    ("create", ChangeOperation::Create),
    ("update", ChangeOperation::Update),
    ("complete", ChangeOperation::Update),
    ("delete", ChangeOperation::Delete),
];
const BRANCH_ACTIONS: &[(&str, ChangeOperation)] = &[
    ("create", ChangeOperation::Create),
    ("update", ChangeOperation::Update),
    ("archive", ChangeOperation::Update),
    ("delete", ChangeOperation::Delete),
];
const CONTEXT_ACTIONS: &[(&str, ChangeOperation)] = &[
    ("create", ChangeOperation::Create),
    ("update", ChangeOperation::Update),
    ("add_insight", ChangeOperation::Update),
    ("add_progress", ChangeOperation::Update),
    ("sync", ChangeOperation::Sync),
    ("delete", ChangeOperation::Delete),
];

/// Parameters of action calls that identify the call rather than describe the change.
const CONTROL_PARAMS: &[&str] = &["action"];

/// Built-in rules in match order.
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule {
            name: "task",
            tools: &["manage_task"],
            matcher: Matcher::Actions(TASK_ACTIONS),
            context_type: ContextType::Task,
            id_params: &["task_id", "id"],
            default_id: None,
            priority: 4,
            requires_sync: true,
        },
        ClassificationRule {
            name: "subtask",
            tools: &["manage_subtask"],
            matcher: Matcher::Actions(SUBTASK_ACTIONS),
            context_type: ContextType::Subtask,
            id_params: &["subtask_id", "id"],
            default_id: None,
            priority: 3,
            requires_sync: true,
        },
        ClassificationRule {
            name: "branch",
            tools: &["manage_git_branch", "manage_branch"],
            matcher: Matcher::Actions(BRANCH_ACTIONS),
            context_type: ContextType::Branch,
            id_params: &["branch_id", "git_branch_id", "id"],
            default_id: None,
            priority: 3,
            requires_sync: true,
        },
        ClassificationRule {
            name: "context",
            tools: &["manage_context"],
            matcher: Matcher::Actions(CONTEXT_ACTIONS),
            context_type: ContextType::Project,
            id_params: &["context_id", "project_id"],
            default_id: Some("current"),
            priority: 2,
            requires_sync: true,
        },
        ClassificationRule {
            name: "git",
            tools: &["Bash"],
            matcher: Matcher::Command(
                Regex::new(r"(?:^\s*|[;&|]\s*)git\s+(commit|merge|checkout|switch|rebase|push|pull)\b")
                    .expect("git command pattern"),
                ChangeOperation::Sync,
            ),
            context_type: ContextType::Branch,
            id_params: &["branch_id", "git_branch_id"],
            default_id: Some("current"),
            priority: 2,
            requires_sync: false,
        },
        ClassificationRule {
            name: "file",
            tools: &["Write", "Edit", "MultiEdit"],
            matcher: Matcher::FilePath(
                Regex::new(r"(?i)(?:^|/)(?:docs?/.+|readme[^/]*|changelog[^/]*|[^/]+\.(?:md|rst))$")
                    .expect("documentation path pattern"),
                ChangeOperation::Update,
            ),
            context_type: ContextType::Project,
            id_params: &["project_id"],
            default_id: Some("current"),
            priority: 1,
            requires_sync: false,
        },
    ]
}

/// Table-driven operation classifier.
#[derive(Debug)]
pub struct OperationClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for OperationClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl OperationClassifier {
    /// Classifier over `rules`, tried in order.
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Rules in match order.
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classify a completed call made at `timestamp`.
    pub fn classify(
        &self,
        tool: &str,
        params: &Value,
        result: Option<&Value>,
        timestamp: f64,
    ) -> Classification {
        if result.is_some_and(reports_failure) {
            trace!(tool, "failed operation, nothing to classify");
            return Classification::Unknown;
        }
        for rule in self.rules.iter().filter(|r| r.tools.contains(&tool)) {
            if let Some(change) = apply_rule(rule, params, result, timestamp) {
                trace!(tool, rule = rule.name, entity = %change.entity_id, "classified");
                return Classification::Change(change);
            }
        }
        trace!(tool, "no classification rule matched");
        Classification::Unknown
    }
}

fn apply_rule(
    rule: &ClassificationRule,
    params: &Value,
    result: Option<&Value>,
    timestamp: f64,
) -> Option<ContextChange> {
    let mut fields = Fields::new();
    let operation = match &rule.matcher {
        Matcher::Actions(actions) => {
            let action = str_param(params, "action")?.to_lowercase();
            let (_, op) = actions.iter().find(|(name, _)| *name == action)?;
            if action == "complete" {
                let _ = fields.insert("status".into(), Value::from("done"));
            }
            *op
        }
        Matcher::Command(pattern, op) => {
            let command = str_param(params, "command")?;
            let verb = pattern.captures(command)?.get(1)?.as_str();
            let _ = fields.insert("git_operation".into(), Value::from(verb));
            *op
        }
        Matcher::FilePath(pattern, op) => {
            let path = str_param(params, "file_path")?;
            if !pattern.is_match(path) {
                return None;
            }
            let _ = fields.insert("modified_file".into(), Value::from(path));
            *op
        }
    };

    let entity_id = rule
        .id_params
        .iter()
        .find_map(|p| str_param(params, p))
        .or_else(|| result.and_then(|r| result_id(r, rule.context_type)))
        .or(rule.default_id)?
        .to_string();

    if let (Matcher::Actions(_), Value::Object(map)) = (&rule.matcher, params) {
        for (key, value) in map {
            if !CONTROL_PARAMS.contains(&key.as_str()) && !rule.id_params.contains(&key.as_str()) {
                let _ = fields.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    Some(
        ContextChange::new(rule.context_type, entity_id, operation, timestamp)
            .with_source(ChangeSource::PostHook)
            .with_fields(fields)
            .with_priority(rule.priority)
            .with_requires_sync(rule.requires_sync),
    )
}

/// Whether a tool result says the call failed.
pub fn reports_failure(result: &Value) -> bool {
    result.get("success").and_then(Value::as_bool) == Some(false)
        || result.get("error").is_some_and(|e| !e.is_null())
}

/// Entity id the tool reported back, e.g. for a `create`.
fn result_id(result: &Value, context_type: ContextType) -> Option<&str> {
    result
        .get(context_type.as_str())
        .and_then(|entity| entity.get("id"))
        .or_else(|| result.get("id"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn str_param<'a>(params: &'a Value, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn classify(tool: &str, params: Value, result: Option<Value>) -> Classification {
        OperationClassifier::default().classify(tool, &params, result.as_ref(), 100.0)
    }

    #[test]
    fn unknown_tool_is_sentinel() {
        assert!(classify("WebFetch", json!({"url": "x"}), None).is_unknown());
        assert!(classify("", json!(null), None).is_unknown());
    }

    #[test]
    fn rule_tool_sets_are_disjoint() {
        let mut seen = HashSet::new();
        for rule in OperationClassifier::default().rules() {
            for tool in rule.tools() {
                assert!(seen.insert(*tool), "{tool} covered by more than one rule");
            }
        }
    }

    #[test]
    fn task_complete_sets_done() {
        let change = classify(
            "manage_task",
            json!({"action": "complete", "task_id": "T1", "completion_summary": "fixed"}),
            Some(json!({"success": true})),
        )
        .into_change()
        .unwrap();
        assert_eq!(change.context_type, ContextType::Task);
        assert_eq!(change.entity_id, "T1");
        assert_eq!(change.operation, ChangeOperation::Update);
        assert_eq!(change.source, ChangeSource::PostHook);
        assert_eq!(change.fields["status"], "done");
        assert_eq!(change.fields["completion_summary"], "fixed");
        assert!(!change.fields.contains_key("action"));
        assert!(!change.fields.contains_key("task_id"));
        assert!((change.timestamp - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn task_create_takes_id_from_result() {
        let change = classify(
            "manage_task",
            json!({"action": "create", "title": "New"}),
            Some(json!({"success": true, "task": {"id": "T9"}})),
        )
        .into_change()
        .unwrap();
        assert_eq!(change.entity_id, "T9");
        assert_eq!(change.operation, ChangeOperation::Create);
    }

    #[test]
    fn task_without_any_id_is_unknown() {
        assert!(classify("manage_task", json!({"action": "update"}), None).is_unknown());
    }

    #[test]
    fn unlisted_action_is_unknown() {
        assert!(classify("manage_task", json!({"action": "get", "task_id": "T1"}), None).is_unknown());
    }

    #[test]
    fn subtask_keeps_parent_task_id() {
        let change = classify(
            "manage_subtask",
            json!({"action": "update", "subtask_id": "S1", "task_id": "T1", "progress_notes": "half"}),
            None,
        )
        .into_change()
        .unwrap();
        assert_eq!(change.context_type, ContextType::Subtask);
        assert_eq!(change.entity_id, "S1");
        assert_eq!(change.fields["task_id"], "T1");
    }

    #[test]
    fn delete_maps_to_delete() {
        let change = classify("manage_git_branch", json!({"action": "delete", "branch_id": "B1"}), None)
            .into_change()
            .unwrap();
        assert_eq!(change.operation, ChangeOperation::Delete);
        assert_eq!(change.context_type, ContextType::Branch);
    }

    #[test]
    fn context_sync_defaults_to_current_project() {
        let change = classify("manage_context", json!({"action": "sync"}), None)
            .into_change()
            .unwrap();
        assert_eq!(change.context_type, ContextType::Project);
        assert_eq!(change.entity_id, "current");
        assert_eq!(change.operation, ChangeOperation::Sync);
    }

    #[test]
    fn git_commands_match_by_regex() {
        let change = classify("Bash", json!({"command": "cargo fmt && git commit -m 'x'"}), None)
            .into_change()
            .unwrap();
        assert_eq!(change.context_type, ContextType::Branch);
        assert_eq!(change.fields["git_operation"], "commit");
        assert!(!change.requires_sync);
        assert!(!change.fields.contains_key("command"));

        assert!(classify("Bash", json!({"command": "git status"}), None).is_unknown());
        assert!(classify("Bash", json!({"command": "echo legit commit"}), None).is_unknown());
    }

    #[test]
    fn documentation_edits_match_by_path() {
        let change = classify("Edit", json!({"file_path": "/repo/docs/guide/setup.txt"}), None)
            .into_change()
            .unwrap();
        assert_eq!(change.context_type, ContextType::Project);
        assert_eq!(change.fields["modified_file"], "/repo/docs/guide/setup.txt");
        assert_eq!(change.priority, 1);

        assert!(!classify("Write", json!({"file_path": "/repo/README"}), None).is_unknown());
        assert!(!classify("MultiEdit", json!({"file_path": "notes.MD"}), None).is_unknown());
        assert!(classify("Edit", json!({"file_path": "/repo/src/main.rs"}), None).is_unknown());
    }

    #[test]
    fn failed_results_are_unknown() {
        let params = json!({"action": "complete", "task_id": "T1"});
        assert!(classify("manage_task", params.clone(), Some(json!({"success": false}))).is_unknown());
        assert!(classify("manage_task", params.clone(), Some(json!({"error": "boom"}))).is_unknown());
        assert!(!classify("manage_task", params, Some(json!({"error": null}))).is_unknown());
    }

    #[test]
    fn classification_is_deterministic() {
        let params = json!({"action": "update", "task_id": "T1", "status": "blocked"});
        let a = classify("manage_task", params.clone(), None).into_change().unwrap();
        let b = classify("manage_task", params, None).into_change().unwrap();
        assert_eq!(a.fields, b.fields);
        assert_eq!(a.conflict_key(), b.conflict_key());
    }
}
