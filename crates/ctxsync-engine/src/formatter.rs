//! Rendering of query payloads into the injected text block.
//!
//! Sections appear in a fixed order when present: task, branch,
//! documentation, related tasks, git. Each is independent; a payload with
//! none of them renders to nothing.

use std::fmt::Write;

use ctxsync_core::text::truncate_with_marker;
use ctxsync_core::{BranchRecord, Fields, ProjectRecord, SearchRecord, TaskRecord};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Payload key of the task record.
pub const TASK_KEY: &str = "task";
/// Payload key of the branch record.
pub const BRANCH_KEY: &str = "branch";
/// Payload key of the project record.
pub const PROJECT_KEY: &str = "project";
/// Payload key of documentation hits.
pub const DOCUMENTATION_KEY: &str = "documentation";
/// Payload key of related task hits.
pub const RELATED_KEY: &str = "related";
/// Payload key of the git section.
pub const GIT_KEY: &str = "git";

const DESCRIPTION_MAX_BYTES: usize = 280;
const MAX_DOCUMENTS: usize = 3;

fn section<T: DeserializeOwned>(payload: &Fields, key: &str) -> Option<T> {
    payload
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Render `payload` as markdown, listing at most `related_limit` related tasks.
pub fn format_context(payload: &Fields, related_limit: usize) -> Option<String> {
    let mut out = String::new();

    if let Some(task) = section::<TaskRecord>(payload, TASK_KEY) {
        write_task(&mut out, &task);
    }
    if let Some(branch) = section::<BranchRecord>(payload, BRANCH_KEY) {
        write_branch(&mut out, &branch);
    }
    if let Some(docs) = section::<Vec<SearchRecord>>(payload, DOCUMENTATION_KEY) {
        write_documentation(&mut out, &docs);
    }
    if let Some(related) = section::<Vec<SearchRecord>>(payload, RELATED_KEY) {
        write_related(&mut out, &related, related_limit);
    }
    let project = section::<ProjectRecord>(payload, PROJECT_KEY);
    write_git(&mut out, payload.get(GIT_KEY), project.as_ref());

    let trimmed = out.trim_end();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn write_task(out: &mut String, task: &TaskRecord) {
    let _ = writeln!(out, "## Current Task");
    let _ = writeln!(out, "**{}** ({})", task.title, task.id);
    let mut meta = Vec::new();
    if let Some(status) = &task.status {
        meta.push(format!("Status: {status}"));
    }
    if let Some(priority) = &task.priority {
        meta.push(format!("Priority: {priority}"));
    }
    if !meta.is_empty() {
        let _ = writeln!(out, "{}", meta.join(" | "));
    }
    if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(out, "{}", truncate_with_marker(description, DESCRIPTION_MAX_BYTES));
    }
    out.push('\n');
}

fn write_branch(out: &mut String, branch: &BranchRecord) {
    let _ = writeln!(out, "## Branch");
    let _ = write!(out, "**{}** ({})", branch.name, branch.id);
    if let Some(status) = &branch.status {
        let _ = write!(out, " | {status}");
    }
    if let Some(count) = branch.task_count {
        let _ = write!(out, " | {count} tasks");
    }
    out.push_str("\n\n");
}

fn write_documentation(out: &mut String, docs: &[SearchRecord]) {
    if docs.is_empty() {
        return;
    }
    let _ = writeln!(out, "## Documentation");
    for doc in docs.iter().take(MAX_DOCUMENTS) {
        match &doc.location {
            Some(location) => {
                let _ = writeln!(out, "- {}: {location}", doc.title);
            }
            None => {
                let _ = writeln!(out, "- {}", doc.title);
            }
        }
    }
    out.push('\n');
}

fn write_related(out: &mut String, related: &[SearchRecord], limit: usize) {
    if related.is_empty() || limit == 0 {
        return;
    }
    let _ = writeln!(out, "## Related Tasks");
    for task in related.iter().take(limit) {
        let _ = write!(out, "- [{}] {}", task.id, task.title);
        if let Some(status) = &task.status {
            let _ = write!(out, " ({status})");
        }
        out.push('\n');
    }
    out.push('\n');
}

fn write_git(out: &mut String, git: Option<&Value>, project: Option<&ProjectRecord>) {
    let command = git
        .and_then(|g| g.get("command"))
        .and_then(Value::as_str);
    if command.is_none() && project.is_none() {
        return;
    }
    let _ = writeln!(out, "## Git");
    if let Some(project) = project {
        let _ = writeln!(out, "Project: {} ({})", project.name, project.id);
    }
    if let Some(command) = command {
        let _ = writeln!(out, "Command: `{command}`");
    }
}
