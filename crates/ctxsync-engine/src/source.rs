//! Remote context source boundary.
//!
//! The source is assumed to be authenticated already. `Ok(None)` means "not
//! found"; `Err` means the call itself failed. The query engine treats both
//! as "no context" for the affected section.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ctxsync_core::{BranchRecord, ProjectRecord, SearchRecord, TaskRecord};
use parking_lot::RwLock;

use crate::errors::SourceError;

/// Where task, branch, and project context comes from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Look up one task.
    async fn fetch_task(&self, task_id: &str) -> Result<Option<TaskRecord>, SourceError>;

    /// Look up one branch.
    async fn fetch_branch(&self, branch_id: &str) -> Result<Option<BranchRecord>, SourceError>;

    /// Look up the current project.
    async fn fetch_project(&self) -> Result<Option<ProjectRecord>, SourceError>;

    /// Free-text search over tasks and documents.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchRecord>, SourceError>;
}

/// In-process source backed by maps.
///
/// Useful for hosts that mirror their task store locally, and for tests that
/// need to count calls or flip the source into a failing state.
#[derive(Debug, Default)]
pub struct InMemorySource {
    tasks: RwLock<HashMap<String, TaskRecord>>,
    branches: RwLock<HashMap<String, BranchRecord>>,
    project: RwLock<Option<ProjectRecord>>,
    documents: RwLock<Vec<SearchRecord>>,
    failing: RwLock<Option<SourceError>>,
    calls: AtomicUsize,
}

impl InMemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a task.
    pub fn put_task(&self, task: TaskRecord) {
        let _ = self.tasks.write().insert(task.id.clone(), task);
    }

    /// Add or replace a branch.
    pub fn put_branch(&self, branch: BranchRecord) {
        let _ = self.branches.write().insert(branch.id.clone(), branch);
    }

    /// Set the project.
    pub fn set_project(&self, project: ProjectRecord) {
        *self.project.write() = Some(project);
    }

    /// Add a searchable document.
    pub fn put_document(&self, document: SearchRecord) {
        self.documents.write().push(document);
    }

    /// Make every subsequent call fail with `error` (`None` restores).
    pub fn fail_with(&self, error: Option<SourceError>) {
        *self.failing.write() = error;
    }

    /// Calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), SourceError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failing.read().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn task_hit(task: &TaskRecord) -> SearchRecord {
    SearchRecord {
        id: task.id.clone(),
        title: task.title.clone(),
        kind: Some("task".to_string()),
        status: task.status.clone(),
        ..SearchRecord::default()
    }
}

#[async_trait]
impl ContextSource for InMemorySource {
    async fn fetch_task(&self, task_id: &str) -> Result<Option<TaskRecord>, SourceError> {
        self.enter()?;
        Ok(self.tasks.read().get(task_id).cloned())
    }

    async fn fetch_branch(&self, branch_id: &str) -> Result<Option<BranchRecord>, SourceError> {
        self.enter()?;
        Ok(self.branches.read().get(branch_id).cloned())
    }

    async fn fetch_project(&self) -> Result<Option<ProjectRecord>, SourceError> {
        self.enter()?;
        Ok(self.project.read().clone())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchRecord>, SourceError> {
        self.enter()?;
        let needle = query.to_lowercase();
        let matches = |text: &str| text.to_lowercase().contains(&needle);

        let mut hits: Vec<SearchRecord> = self
            .documents
            .read()
            .iter()
            .filter(|d| matches(&d.title) || d.location.as_deref().is_some_and(matches))
            .cloned()
            .collect();

        let mut tasks: Vec<&TaskRecord> = Vec::new();
        let guard = self.tasks.read();
        tasks.extend(guard.values().filter(|t| {
            matches(&t.title) || t.description.as_deref().is_some_and(matches)
        }));
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        hits.extend(tasks.into_iter().map(task_hit));

        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn task(id: &str, title: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            title: title.into(),
            ..TaskRecord::default()
        }
    }

    #[tokio::test]
    async fn in_memory_lookup() {
        let source = InMemorySource::new();
        source.put_task(task("T1", "Fix bug"));
        assert_eq!(source.fetch_task("T1").await.unwrap().unwrap().title, "Fix bug");
        assert!(source.fetch_task("T2").await.unwrap().is_none());
        assert!(source.fetch_project().await.unwrap().is_none());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn in_memory_failure_toggle() {
        let source = InMemorySource::new();
        source.put_task(task("T1", "Fix bug"));
        source.fail_with(Some(SourceError::Unavailable("down".into())));
        assert_matches!(source.fetch_task("T1").await, Err(SourceError::Unavailable(_)));
        source.fail_with(None);
        assert!(source.fetch_task("T1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn search_matches_documents_then_tasks() {
        let source = InMemorySource::new();
        source.put_document(SearchRecord {
            id: "D1".into(),
            title: "Cache design".into(),
            kind: Some("document".into()),
            location: Some("docs/cache.md".into()),
            ..SearchRecord::default()
        });
        source.put_task(task("T2", "Tune cache TTL"));
        source.put_task(task("T1", "Cache eviction bug"));
        source.put_task(task("T3", "Unrelated"));

        let hits = source.search("CACHE", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["D1", "T1", "T2"]);
        assert_eq!(hits[1].kind.as_deref(), Some("task"));

        assert_eq!(source.search("cache", 2).await.unwrap().len(), 2);
    }
}
