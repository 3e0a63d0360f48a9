//! Bounded audit trail of detection and capture decisions.
//!
//! In-memory only and capped; the oldest entry is dropped when full. Tool
//! arguments are redacted before storage.

use std::collections::{BTreeMap, VecDeque};

use ctxsync_core::text::truncate_str;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Default cap on stored entries.
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// Argument keys whose values are never stored.
const SENSITIVE_KEYS: &[&str] = &["password", "token", "secret", "auth", "credential", "api_key", "apikey"];

/// Longest string argument stored before truncation.
const MAX_STRING_LENGTH: usize = 500;

/// What was audited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Context injection before a tool ran.
    Inject,
    /// Change capture after a tool ran.
    Capture,
    /// Synchronization cycle.
    Sync,
}

/// One audit record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditEntry {
    /// When it happened, Unix seconds.
    pub timestamp: f64,
    /// Tool involved (empty for sync cycles).
    pub tool_name: String,
    /// Kind of decision.
    pub operation_type: AuditOperation,
    /// Whether the step produced its result.
    pub success: bool,
    /// Requirement or change summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement_summary: Option<String>,
    /// Redacted tool arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl AuditEntry {
    /// Entry with no summary or arguments.
    pub fn new(
        timestamp: f64,
        tool_name: impl Into<String>,
        operation_type: AuditOperation,
        success: bool,
    ) -> Self {
        Self {
            timestamp,
            tool_name: tool_name.into(),
            operation_type,
            success,
            requirement_summary: None,
            arguments: None,
        }
    }

    /// Attach a summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.requirement_summary = Some(summary.into());
        self
    }

    /// Attach arguments, redacted.
    #[must_use]
    pub fn with_arguments(mut self, arguments: &Value) -> Self {
        self.arguments = Some(redact_sensitive(arguments));
        self
    }
}

/// Destination for audit entries. Writes never fail from the caller's view.
pub trait AuditSink: Send + Sync {
    /// Append an entry, dropping it silently if it cannot be stored.
    fn record(&self, entry: AuditEntry);
}

/// Counts over the stored entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Entries stored.
    pub total: usize,
    /// Entries with `success == false`.
    pub failures: usize,
    /// Entries per operation type.
    pub by_operation: BTreeMap<AuditOperation, usize>,
}

/// Circular in-memory audit log.
pub struct InMemoryAuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    max_entries: usize,
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl std::fmt::Debug for InMemoryAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAuditLog")
            .field("entries", &self.entries.lock().len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl InMemoryAuditLog {
    /// Log holding at most `max_entries`.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries,
        }
    }

    /// Most recent entries, oldest first, optionally limited.
    pub fn entries(&self, limit: Option<usize>) -> Vec<AuditEntry> {
        let entries = self.entries.lock();
        let count = limit.unwrap_or(entries.len());
        entries.iter().rev().take(count).rev().cloned().collect()
    }

    /// Entries for one tool.
    pub fn entries_for_tool(&self, tool_name: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.tool_name == tool_name)
            .cloned()
            .collect()
    }

    /// Counts over stored entries.
    pub fn stats(&self) -> AuditStats {
        let entries = self.entries.lock();
        let mut stats = AuditStats {
            total: entries.len(),
            ..AuditStats::default()
        };
        for entry in entries.iter() {
            if !entry.success {
                stats.failures += 1;
            }
            *stats.by_operation.entry(entry.operation_type).or_insert(0) += 1;
        }
        stats
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Entries stored.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) {
        if self.max_entries == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            let _ = entries.pop_front();
        }
    }
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _entry: AuditEntry) {}
}

/// Replace secret-looking values with `[REDACTED]` and truncate long strings.
pub fn redact_sensitive(args: &Value) -> Value {
    let Value::Object(map) = args else {
        return args.clone();
    };
    let mut redacted = Map::new();
    for (key, value) in map {
        let lower = key.to_lowercase();
        let stored = if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) {
            Value::from("[REDACTED]")
        } else {
            match value {
                Value::String(s) if s.len() > MAX_STRING_LENGTH => {
                    Value::from(format!("{}... [truncated]", truncate_str(s, MAX_STRING_LENGTH)))
                }
                Value::Object(_) => redact_sensitive(value),
                _ => value.clone(),
            }
        };
        let _ = redacted.insert(key.clone(), stored);
    }
    Value::Object(redacted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(tool: &str, op: AuditOperation, success: bool) -> AuditEntry {
        AuditEntry::new(1.0, tool, op, success)
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let log = InMemoryAuditLog::new(3);
        for i in 0..5 {
            log.record(entry(&format!("tool{i}"), AuditOperation::Inject, true));
        }
        let entries = log.entries(None);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].tool_name, "tool2");
        assert_eq!(entries[2].tool_name, "tool4");
    }

    #[test]
    fn default_capacity_is_200() {
        let log = InMemoryAuditLog::default();
        for _ in 0..250 {
            log.record(entry("Read", AuditOperation::Inject, true));
        }
        assert_eq!(log.len(), 200);
    }

    #[test]
    fn entries_limit_returns_most_recent() {
        let log = InMemoryAuditLog::default();
        for i in 0..4 {
            log.record(entry(&format!("t{i}"), AuditOperation::Capture, true));
        }
        let last_two: Vec<String> = log.entries(Some(2)).into_iter().map(|e| e.tool_name).collect();
        assert_eq!(last_two, vec!["t2", "t3"]);
    }

    #[test]
    fn stats_count_failures_and_operations() {
        let log = InMemoryAuditLog::default();
        log.record(entry("Read", AuditOperation::Inject, true));
        log.record(entry("manage_task", AuditOperation::Capture, false));
        log.record(entry("", AuditOperation::Sync, true));
        let stats = log.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.by_operation[&AuditOperation::Capture], 1);
        assert_eq!(log.entries_for_tool("Read").len(), 1);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn arguments_are_redacted() {
        let e = entry("manage_task", AuditOperation::Inject, true).with_arguments(&json!({
            "task_id": "T1",
            "apiToken": "abc",
            "nested": {"password": "p", "ok": 1},
            "notes": "x".repeat(600)
        }));
        let args = e.arguments.unwrap();
        assert_eq!(args["task_id"], "T1");
        assert_eq!(args["apiToken"], "[REDACTED]");
        assert_eq!(args["nested"]["password"], "[REDACTED]");
        assert_eq!(args["nested"]["ok"], 1);
        assert!(args["notes"].as_str().unwrap().ends_with("... [truncated]"));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let log = InMemoryAuditLog::new(0);
        log.record(entry("Read", AuditOperation::Inject, true));
        assert!(log.is_empty());
    }

    #[test]
    fn serializes_snake_case() {
        let e = entry("Read", AuditOperation::Inject, true).with_summary("file file_path=a.md");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["operation_type"], "inject");
        assert_eq!(json["requirement_summary"], "file file_path=a.md");
        assert!(json.get("arguments").is_none());
    }
}
