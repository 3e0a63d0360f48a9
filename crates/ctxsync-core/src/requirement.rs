//! Context requirements produced by relevance detection.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{Priority, RequirementKind};

/// Identifiers a requirement targets. Absent identifiers are omitted from
/// the canonical serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequirementTargets {
    /// Task the operation is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Subtask the operation is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask_id: Option<String>,
    /// Branch (task tree) the operation is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    /// File being read or edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Search pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Shell command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Tool action value (e.g. `get`, `update`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// What contextual data an upcoming operation needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextRequirement {
    /// Fetch routine to dispatch to.
    pub kind: RequirementKind,
    /// Identifiers to fetch for.
    pub targets: RequirementTargets,
    /// Urgency.
    pub priority: Priority,
}

impl ContextRequirement {
    /// Create a requirement.
    #[must_use]
    pub fn new(kind: RequirementKind, targets: RequirementTargets, priority: Priority) -> Self {
        Self {
            kind,
            targets,
            priority,
        }
    }

    /// Canonical serialization: JSON with keys sorted at every level.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        serde_json::to_value(self)
            .map(|value| sort_keys(value).to_string())
            .unwrap_or_default()
    }

    /// First 16 hex characters of the SHA-256 of [`canonical_json`](Self::canonical_json).
    #[must_use]
    pub fn canonical_hash(&self) -> String {
        let digest = Sha256::digest(self.canonical_json().as_bytes());
        let mut out = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    /// Entity scope used to group cached results for invalidation:
    /// `task:{id}`, `branch:{id}`, or the kind label.
    #[must_use]
    pub fn scope(&self) -> String {
        if let Some(task_id) = &self.targets.task_id {
            format!("task:{task_id}")
        } else if let Some(branch_id) = &self.targets.branch_id {
            format!("branch:{branch_id}")
        } else {
            self.kind.as_str().to_string()
        }
    }

    /// Deterministic cache key: `query:{scope}:{hash}`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("query:{}:{}", self.scope(), self.canonical_hash())
    }

    /// One-line human summary for audit entries.
    #[must_use]
    pub fn summary(&self) -> String {
        let t = &self.targets;
        let mut parts = vec![self.kind.as_str().to_string()];
        let named = [
            ("task_id", &t.task_id),
            ("subtask_id", &t.subtask_id),
            ("branch_id", &t.branch_id),
            ("file_path", &t.file_path),
            ("pattern", &t.pattern),
            ("action", &t.action),
        ];
        for (name, value) in named {
            if let Some(v) = value {
                parts.push(format!("{name}={v}"));
            }
        }
        parts.join(" ")
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_req(task_id: &str) -> ContextRequirement {
        ContextRequirement::new(
            RequirementKind::McpOperation,
            RequirementTargets {
                task_id: Some(task_id.to_string()),
                action: Some("get".to_string()),
                ..Default::default()
            },
            Priority::High,
        )
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let json = task_req("T1").canonical_json();
        let kind_pos = json.find("\"kind\"").unwrap();
        let priority_pos = json.find("\"priority\"").unwrap();
        let targets_pos = json.find("\"targets\"").unwrap();
        assert!(kind_pos < priority_pos && priority_pos < targets_pos);
        let action_pos = json.find("\"action\"").unwrap();
        let task_pos = json.find("\"task_id\"").unwrap();
        assert!(action_pos < task_pos);
    }

    #[test]
    fn hash_is_deterministic_and_sixteen_hex_chars() {
        let a = task_req("T1").canonical_hash();
        let b = task_req("T1").canonical_hash();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_targets_hash_differently() {
        assert_ne!(task_req("T1").canonical_hash(), task_req("T2").canonical_hash());
    }

    #[test]
    fn scope_prefers_task_then_branch_then_kind() {
        assert_eq!(task_req("T1").scope(), "task:T1");

        let branch = ContextRequirement::new(
            RequirementKind::GitOperation,
            RequirementTargets {
                branch_id: Some("B1".to_string()),
                ..Default::default()
            },
            Priority::Medium,
        );
        assert_eq!(branch.scope(), "branch:B1");

        let search = ContextRequirement::new(
            RequirementKind::SearchOperation,
            RequirementTargets {
                pattern: Some("TODO".to_string()),
                ..Default::default()
            },
            Priority::Low,
        );
        assert_eq!(search.scope(), "search");
    }

    #[test]
    fn cache_key_has_scope_prefix() {
        let key = task_req("T1").cache_key();
        assert!(key.starts_with("query:task:T1:"));
    }

    #[test]
    fn summary_lists_present_targets() {
        assert_eq!(task_req("T9").summary(), "mcp task_id=T9 action=get");
    }
}
