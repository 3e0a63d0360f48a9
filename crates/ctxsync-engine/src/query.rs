//! Cached, time-boxed context queries.
//!
//! `query` consults the cache first. On a miss it dispatches to the fetch
//! routine for the requirement kind under the fetch timeout, caches a
//! successful payload with the kind's TTL, and returns. Failures and
//! timeouts are logged and come back as `None`; they are never cached.
//!
//! Concurrent queries for the same requirement share one fetch: the first
//! caller runs it and the rest await its result.
//!
//! A mandatory identifier the source cannot resolve aborts the whole fetch.
//! Optional enrichments (branch, related tasks, project) are dropped quietly
//! when their calls fail.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use ctxsync_core::{
    ContextRequirement, Fields, RequirementKind, RequirementTargets, SearchRecord,
};
use ctxsync_settings::QuerySettings;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::cache::{ContextCache, LAST_SYNC_FIELD};
use crate::errors::{QueryError, SourceError};
use crate::formatter::{
    BRANCH_KEY, DOCUMENTATION_KEY, GIT_KEY, PROJECT_KEY, RELATED_KEY, TASK_KEY,
};
use crate::source::ContextSource;

type InFlight = Arc<OnceCell<Option<Fields>>>;

/// Cache key of the current project entity.
const PROJECT_ENTITY: &str = "project:current";

/// Query engine over one cache and one source.
pub struct QueryEngine {
    cache: Arc<ContextCache>,
    source: Arc<dyn ContextSource>,
    settings: QuerySettings,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl QueryEngine {
    /// Build an engine.
    pub fn new(
        cache: Arc<ContextCache>,
        source: Arc<dyn ContextSource>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            cache,
            source,
            settings,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Query settings in effect.
    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Payload for `requirement`, from cache or source. Never fails.
    #[instrument(skip_all, fields(kind = %requirement.kind, scope = %requirement.scope()))]
    pub async fn query(&self, requirement: &ContextRequirement) -> Option<Fields> {
        let key = requirement.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "context served from cache");
            return Some(hit);
        }

        let cell = Arc::clone(self.in_flight.lock().entry(key.clone()).or_default());
        let payload = cell
            .get_or_init(|| self.fetch_and_store(requirement, &key))
            .await
            .clone();

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            let _ = in_flight.remove(&key);
        }
        payload
    }

    async fn fetch_and_store(&self, requirement: &ContextRequirement, key: &str) -> Option<Fields> {
        match self.fetch(requirement).await {
            Ok(Some(payload)) => {
                let ttl = self.cache.ttl_for(requirement.kind.ttl_context_type());
                self.cache
                    .set_derived(key, payload.clone(), ttl, dependencies(&payload));
                Some(payload)
            }
            Ok(None) => {
                debug!("no context available");
                None
            }
            Err(err) => {
                warn!(category = err.category(), error = %err, "context query failed");
                None
            }
        }
    }

    /// Blocking adapter for callers outside an async context.
    ///
    /// Runs [`query`](Self::query) on a dedicated current-thread runtime with
    /// the same deadline. Inside a runtime the work moves to a scoped thread
    /// so the caller's runtime is never re-entered.
    pub fn query_blocking(&self, requirement: &ContextRequirement) -> Option<Fields> {
        let run = || -> Result<Option<Fields>, QueryError> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| QueryError::Runtime(e.to_string()))?;
            Ok(runtime.block_on(self.query(requirement)))
        };

        let outcome = if tokio::runtime::Handle::try_current().is_ok() {
            std::thread::scope(|scope| {
                scope
                    .spawn(run)
                    .join()
                    .unwrap_or_else(|_| Err(QueryError::Runtime("query thread panicked".into())))
            })
        } else {
            run()
        };

        outcome.unwrap_or_else(|err| {
            warn!(error = %err, "blocking query could not run");
            None
        })
    }

    /// Uncached fetch under the fetch timeout.
    pub async fn fetch(
        &self,
        requirement: &ContextRequirement,
    ) -> Result<Option<Fields>, QueryError> {
        let timeout = self.settings.fetch_timeout();
        let routine = async {
            let t = &requirement.targets;
            match requirement.kind {
                RequirementKind::McpOperation => self.fetch_task_context(t).await,
                RequirementKind::FileOperation => self.fetch_documentation(t).await,
                RequirementKind::GitOperation => self.fetch_git_context(t).await,
                RequirementKind::SearchOperation => self.fetch_search(t).await,
            }
        };
        tokio::time::timeout(timeout, routine)
            .await
            .map_err(|_| QueryError::Timeout {
                kind: requirement.kind,
                timeout_ms: self.settings.fetch_timeout_ms,
            })?
    }

    async fn fetch_task_context(
        &self,
        t: &RequirementTargets,
    ) -> Result<Option<Fields>, QueryError> {
        let mut payload = Fields::new();

        if let Some(task_id) = &t.task_id {
            let task = self
                .source
                .fetch_task(task_id)
                .await?
                .ok_or_else(|| QueryError::RequiredMissing {
                    entity: "task",
                    id: task_id.clone(),
                })?;

            if let Some(branch_id) = t.branch_id.as_ref().or(task.branch_id.as_ref()) {
                if let Some(branch) = optional("branch", self.source.fetch_branch(branch_id)).await {
                    self.put_entity(&mut payload, BRANCH_KEY, &branch, &format!("branch:{branch_id}"))?;
                }
            }
            let related = self.related_tasks(&task.title, task_id).await;
            if !related.is_empty() {
                let related = related
                    .iter()
                    .map(|hit| -> Result<Value, serde_json::Error> {
                        Ok(self.synced(serde_json::to_value(hit)?, &format!("task:{}", hit.id)))
                    })
                    .collect::<Result<Vec<Value>, _>>()?;
                let _ = payload.insert(RELATED_KEY.to_string(), Value::Array(related));
            }
            self.put_entity(&mut payload, TASK_KEY, &task, &format!("task:{task_id}"))?;
        } else if let Some(branch_id) = &t.branch_id {
            let branch = self
                .source
                .fetch_branch(branch_id)
                .await?
                .ok_or_else(|| QueryError::RequiredMissing {
                    entity: "branch",
                    id: branch_id.clone(),
                })?;
            self.put_entity(&mut payload, BRANCH_KEY, &branch, &format!("branch:{branch_id}"))?;
        } else {
            let project = self
                .source
                .fetch_project()
                .await?
                .ok_or_else(|| QueryError::RequiredMissing {
                    entity: "project",
                    id: "current".to_string(),
                })?;
            self.put_entity(&mut payload, PROJECT_KEY, &project, PROJECT_ENTITY)?;
        }

        Ok(Some(payload))
    }

    async fn fetch_documentation(
        &self,
        t: &RequirementTargets,
    ) -> Result<Option<Fields>, QueryError> {
        let Some(term) = t
            .file_path
            .as_deref()
            .or(t.pattern.as_deref())
            .and_then(documentation_term)
        else {
            return Ok(None);
        };

        let docs: Vec<SearchRecord> = self
            .source
            .search(&term, self.settings.search_limit)
            .await?
            .into_iter()
            .filter(is_document)
            .collect();
        if docs.is_empty() {
            return Ok(None);
        }

        let mut payload = Fields::new();
        put(&mut payload, DOCUMENTATION_KEY, &docs)?;
        if let Some(project) = optional("project", self.source.fetch_project()).await {
            self.put_entity(&mut payload, PROJECT_KEY, &project, PROJECT_ENTITY)?;
        }
        Ok(Some(payload))
    }

    async fn fetch_git_context(
        &self,
        t: &RequirementTargets,
    ) -> Result<Option<Fields>, QueryError> {
        let mut payload = Fields::new();

        if let Some(branch_id) = &t.branch_id {
            let branch = self
                .source
                .fetch_branch(branch_id)
                .await?
                .ok_or_else(|| QueryError::RequiredMissing {
                    entity: "branch",
                    id: branch_id.clone(),
                })?;
            self.put_entity(&mut payload, BRANCH_KEY, &branch, &format!("branch:{branch_id}"))?;
        }
        if let Some(project) = optional("project", self.source.fetch_project()).await {
            self.put_entity(&mut payload, PROJECT_KEY, &project, PROJECT_ENTITY)?;
        }
        if payload.is_empty() {
            return Ok(None);
        }
        if let Some(command) = &t.command {
            let _ = payload.insert(GIT_KEY.to_string(), json!({ "command": command }));
        }
        Ok(Some(payload))
    }

    async fn fetch_search(&self, t: &RequirementTargets) -> Result<Option<Fields>, QueryError> {
        let Some(pattern) = t.pattern.as_deref() else {
            return Ok(None);
        };
        let hits = self
            .source
            .search(pattern, self.settings.search_limit)
            .await?;

        let (docs, tasks): (Vec<SearchRecord>, Vec<SearchRecord>) =
            hits.into_iter().partition(is_document);
        if docs.is_empty() && tasks.is_empty() {
            return Ok(None);
        }

        let mut payload = Fields::new();
        if !docs.is_empty() {
            put(&mut payload, DOCUMENTATION_KEY, &docs)?;
        }
        if !tasks.is_empty() {
            let tasks: Vec<SearchRecord> = tasks
                .into_iter()
                .take(self.settings.related_tasks_limit)
                .collect();
            put(&mut payload, RELATED_KEY, &tasks)?;
        }
        Ok(Some(payload))
    }

    /// `value` with fields synced into the cache under `entity_key` laid over
    /// it. Synced changes are newer than what the source returned.
    fn synced(&self, mut value: Value, entity_key: &str) -> Value {
        if let (Value::Object(record), Some(fields)) = (&mut value, self.cache.peek(entity_key)) {
            record.extend(fields.into_iter().filter(|(k, _)| k != LAST_SYNC_FIELD));
        }
        value
    }

    fn put_entity<T: Serialize>(
        &self,
        payload: &mut Fields,
        key: &str,
        record: &T,
        entity_key: &str,
    ) -> Result<(), QueryError> {
        let value = self.synced(serde_json::to_value(record)?, entity_key);
        let _ = payload.insert(key.to_string(), value);
        Ok(())
    }

    /// Tasks related to `title`, excluding `task_id` itself. Best-effort.
    async fn related_tasks(&self, title: &str, task_id: &str) -> Vec<SearchRecord> {
        let Some(hits) = optional_list(
            "related tasks",
            self.source.search(title, self.settings.search_limit),
        )
        .await
        else {
            return Vec::new();
        };
        hits.into_iter()
            .filter(|h| h.id != task_id && !is_document(h))
            .take(self.settings.related_tasks_limit)
            .collect()
    }
}

/// Await an optional enrichment, dropping failures.
async fn optional<T>(
    what: &'static str,
    call: impl Future<Output = Result<Option<T>, SourceError>>,
) -> Option<T> {
    match call.await {
        Ok(found) => found,
        Err(err) => {
            debug!(what, error = %err, "optional enrichment skipped");
            None
        }
    }
}

async fn optional_list<T>(
    what: &'static str,
    call: impl Future<Output = Result<Vec<T>, SourceError>>,
) -> Option<Vec<T>> {
    optional(what, async { call.await.map(Some) }).await
}

fn put<T: Serialize>(payload: &mut Fields, key: &str, value: &T) -> Result<(), QueryError> {
    let _ = payload.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(())
}

/// Entity keys a payload was built from.
fn dependencies(payload: &Fields) -> Vec<String> {
    fn id_of(value: &Value) -> Option<&str> {
        value.get("id").and_then(Value::as_str)
    }

    let mut keys = Vec::new();
    if let Some(id) = payload.get(TASK_KEY).and_then(id_of) {
        keys.push(format!("task:{id}"));
    }
    if let Some(id) = payload.get(BRANCH_KEY).and_then(id_of) {
        keys.push(format!("branch:{id}"));
    }
    if let Some(related) = payload.get(RELATED_KEY).and_then(Value::as_array) {
        keys.extend(related.iter().filter_map(id_of).map(|id| format!("task:{id}")));
    }
    keys
}

fn is_document(hit: &SearchRecord) -> bool {
    match hit.kind.as_deref() {
        Some(kind) => kind == "document",
        None => hit.location.is_some(),
    }
}

/// Search term for documentation about a path or glob: the file stem,
/// unless it is only a wildcard.
fn documentation_term(path: &str) -> Option<String> {
    let stem = Path::new(path).file_stem()?.to_str()?;
    let stem = stem.trim_matches('*');
    (!stem.is_empty() && !stem.contains(['*', '?', '{'])).then(|| stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockContextSource;
    use ctxsync_core::{BranchRecord, ManualClock, Priority, ProjectRecord, TaskRecord};
    use ctxsync_logging::test_utils::capture_logs;
    use ctxsync_settings::TtlSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing::Level;

    fn task(id: &str, title: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            title: title.into(),
            ..TaskRecord::default()
        }
    }

    fn mcp(task_id: &str) -> ContextRequirement {
        ContextRequirement::new(
            RequirementKind::McpOperation,
            RequirementTargets {
                task_id: Some(task_id.into()),
                action: Some("get".into()),
                ..RequirementTargets::default()
            },
            Priority::High,
        )
    }

    fn engine_with(source: MockContextSource) -> (QueryEngine, Arc<ContextCache>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(ContextCache::new(clock.clone(), TtlSettings::default()));
        let engine = QueryEngine::new(cache.clone(), Arc::new(source), QuerySettings::default());
        (engine, cache, clock)
    }

    #[tokio::test]
    async fn second_query_is_served_from_cache() {
        let mut source = MockContextSource::new();
        let _ = source
            .expect_fetch_task()
            .times(1)
            .returning(|id| Ok(Some(task(id, "Fix bug"))));
        let _ = source.expect_search().returning(|_, _| Ok(Vec::new()));
        let (engine, cache, _) = engine_with(source);

        let first = engine.query(&mcp("T1")).await.unwrap();
        assert_eq!(first[TASK_KEY]["title"], "Fix bug");
        let second = engine.query(&mcp("T1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn cached_payload_expires_with_task_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut source = MockContextSource::new();
        let _ = source.expect_fetch_task().returning(move |id| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(task(id, "Fix bug")))
        });
        let _ = source.expect_search().returning(|_, _| Ok(Vec::new()));
        let (engine, _, clock) = engine_with(source);

        let _ = engine.query(&mcp("T1")).await;
        clock.advance(Duration::from_secs(901));
        let _ = engine.query(&mcp("T1")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unresolved_required_task_is_absent_and_not_cached() {
        let mut source = MockContextSource::new();
        let _ = source.expect_fetch_task().times(2).returning(|_| Ok(None));
        let (engine, cache, _) = engine_with(source);

        assert!(engine.query(&mcp("T404")).await.is_none());
        assert!(engine.query(&mcp("T404")).await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn source_failure_is_logged_and_absent() {
        let (logs, _guard) = capture_logs();
        let mut source = MockContextSource::new();
        let _ = source
            .expect_fetch_task()
            .returning(|_| Err(SourceError::Unavailable("down".into())));
        let (engine, cache, _) = engine_with(source);

        assert!(engine.query(&mcp("T1")).await.is_none());
        assert!(cache.is_empty());
        assert!(logs.has_event(Level::WARN, "context query failed"));
    }

    #[tokio::test]
    async fn optional_enrichments_fail_quietly() {
        let mut source = MockContextSource::new();
        let _ = source.expect_fetch_task().returning(|id| {
            Ok(Some(TaskRecord {
                branch_id: Some("B1".into()),
                ..task(id, "Fix bug")
            }))
        });
        let _ = source
            .expect_fetch_branch()
            .returning(|_| Err(SourceError::Unavailable("down".into())));
        let _ = source
            .expect_search()
            .returning(|_, _| Err(SourceError::Unavailable("down".into())));
        let (engine, _, _) = engine_with(source);

        let payload = engine.query(&mcp("T1")).await.unwrap();
        assert!(payload.contains_key(TASK_KEY));
        assert!(!payload.contains_key(BRANCH_KEY));
        assert!(!payload.contains_key(RELATED_KEY));
    }

    #[tokio::test]
    async fn related_tasks_exclude_self_and_respect_limit() {
        let mut source = MockContextSource::new();
        let _ = source
            .expect_fetch_task()
            .returning(|id| Ok(Some(task(id, "Cache"))));
        let _ = source.expect_search().returning(|_, _| {
            Ok(["T1", "T2", "T3", "T4", "T5"]
                .iter()
                .map(|id| SearchRecord {
                    id: (*id).into(),
                    title: format!("Cache {id}"),
                    kind: Some("task".into()),
                    ..SearchRecord::default()
                })
                .collect())
        });
        let (engine, _, _) = engine_with(source);

        let payload = engine.query(&mcp("T1")).await.unwrap();
        let related = payload[RELATED_KEY].as_array().unwrap();
        let ids: Vec<&str> = related.iter().filter_map(|r| r["id"].as_str()).collect();
        assert_eq!(ids, vec!["T2", "T3", "T4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out() {
        struct Slow;
        #[async_trait::async_trait]
        impl ContextSource for Slow {
            async fn fetch_task(&self, id: &str) -> Result<Option<TaskRecord>, SourceError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Some(task(id, "late")))
            }
            async fn fetch_branch(&self, _: &str) -> Result<Option<BranchRecord>, SourceError> {
                Ok(None)
            }
            async fn fetch_project(&self) -> Result<Option<ProjectRecord>, SourceError> {
                Ok(None)
            }
            async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchRecord>, SourceError> {
                Ok(Vec::new())
            }
        }

        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(ContextCache::new(clock, TtlSettings::default()));
        let engine = QueryEngine::new(cache.clone(), Arc::new(Slow), QuerySettings::default());

        let err = engine.fetch(&mcp("T1")).await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout { timeout_ms: 400, .. }));
        assert!(engine.query(&mcp("T1")).await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_queries_share_one_fetch() {
        struct Counting(AtomicUsize);
        #[async_trait::async_trait]
        impl ContextSource for Counting {
            async fn fetch_task(&self, id: &str) -> Result<Option<TaskRecord>, SourceError> {
                let _ = self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Some(task(id, "Fix bug")))
            }
            async fn fetch_branch(&self, _: &str) -> Result<Option<BranchRecord>, SourceError> {
                Ok(None)
            }
            async fn fetch_project(&self) -> Result<Option<ProjectRecord>, SourceError> {
                Ok(None)
            }
            async fn search(&self, _: &str, _: usize) -> Result<Vec<SearchRecord>, SourceError> {
                Ok(Vec::new())
            }
        }

        let source = Arc::new(Counting(AtomicUsize::new(0)));
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(ContextCache::new(clock, TtlSettings::default()));
        let engine = QueryEngine::new(cache, source.clone(), QuerySettings::default());

        let (req_a, req_b) = (mcp("T1"), mcp("T1"));
        let (a, b) = tokio::join!(engine.query(&req_a), engine.query(&req_b));
        assert_eq!(a.unwrap()[TASK_KEY]["title"], "Fix bug");
        assert_eq!(b.unwrap()[TASK_KEY]["title"], "Fix bug");
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
        assert!(engine.in_flight.lock().is_empty());

        let _ = engine.query(&mcp("T2")).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn payload_records_entities_and_prefers_synced_fields() {
        let mut source = MockContextSource::new();
        let _ = source.expect_fetch_task().returning(|id| {
            Ok(Some(TaskRecord {
                branch_id: Some("B1".into()),
                ..task(id, "Fix bug")
            }))
        });
        let _ = source.expect_fetch_branch().returning(|id| {
            Ok(Some(BranchRecord {
                id: id.into(),
                name: "old-name".into(),
                ..BranchRecord::default()
            }))
        });
        let _ = source.expect_search().returning(|_, _| {
            Ok(vec![SearchRecord {
                id: "T2".into(),
                title: "Fix bug follow-up".into(),
                kind: Some("task".into()),
                status: Some("todo".into()),
                ..SearchRecord::default()
            }])
        });
        let (engine, cache, _) = engine_with(source);
        cache.set(
            "task:T2",
            serde_json::from_value(json!({"status": "done", "last_sync": 1.0})).unwrap(),
            Duration::from_secs(60),
        );

        let payload = engine.query(&mcp("T1")).await.unwrap();
        assert_eq!(payload[BRANCH_KEY]["name"], "old-name");
        assert_eq!(payload[RELATED_KEY][0]["status"], "done");
        assert!(payload[RELATED_KEY][0].get(LAST_SYNC_FIELD).is_none());

        let entry = cache.get_entry(&mcp("T1").cache_key()).unwrap();
        assert_eq!(
            entry.dependencies,
            vec!["task:T1".to_string(), "branch:B1".to_string(), "task:T2".to_string()]
        );
    }

    #[tokio::test]
    async fn branch_only_mcp_requires_branch() {
        let mut source = MockContextSource::new();
        let _ = source.expect_fetch_branch().returning(|id| {
            Ok(Some(BranchRecord {
                id: id.into(),
                name: "feature/x".into(),
                ..BranchRecord::default()
            }))
        });
        let (engine, _, _) = engine_with(source);
        let req = ContextRequirement::new(
            RequirementKind::McpOperation,
            RequirementTargets {
                branch_id: Some("B1".into()),
                ..RequirementTargets::default()
            },
            Priority::Medium,
        );
        let payload = engine.query(&req).await.unwrap();
        assert_eq!(payload[BRANCH_KEY]["name"], "feature/x");
    }

    #[tokio::test]
    async fn documentation_lookup_uses_file_stem() {
        let mut source = MockContextSource::new();
        let _ = source
            .expect_search()
            .withf(|term, _| term.contains("cache"))
            .returning(|_, _| {
                Ok(vec![
                    SearchRecord {
                        id: "D1".into(),
                        title: "Cache design".into(),
                        kind: Some("document".into()),
                        location: Some("docs/cache.md".into()),
                        ..SearchRecord::default()
                    },
                    SearchRecord {
                        id: "T9".into(),
                        title: "cache task".into(),
                        kind: Some("task".into()),
                        ..SearchRecord::default()
                    },
                ])
            });
        let _ = source.expect_fetch_project().returning(|| Ok(None));
        let (engine, _, _) = engine_with(source);
        let req = ContextRequirement::new(
            RequirementKind::FileOperation,
            RequirementTargets {
                file_path: Some("/repo/src/cache.rs".into()),
                ..RequirementTargets::default()
            },
            Priority::Low,
        );
        let payload = engine.query(&req).await.unwrap();
        assert_eq!(payload[DOCUMENTATION_KEY].as_array().unwrap().len(), 1);
        assert!(!payload.contains_key(PROJECT_KEY));
    }

    #[tokio::test]
    async fn git_context_without_anything_known_is_absent() {
        let mut source = MockContextSource::new();
        let _ = source.expect_fetch_project().returning(|| Ok(None));
        let (engine, _, _) = engine_with(source);
        let req = ContextRequirement::new(
            RequirementKind::GitOperation,
            RequirementTargets {
                command: Some("git status".into()),
                ..RequirementTargets::default()
            },
            Priority::Medium,
        );
        assert!(engine.query(&req).await.is_none());
    }

    #[tokio::test]
    async fn git_context_includes_command_and_project() {
        let mut source = MockContextSource::new();
        let _ = source.expect_fetch_project().returning(|| {
            Ok(Some(ProjectRecord {
                id: "P1".into(),
                name: "ctxsync".into(),
                ..ProjectRecord::default()
            }))
        });
        let (engine, _, _) = engine_with(source);
        let req = ContextRequirement::new(
            RequirementKind::GitOperation,
            RequirementTargets {
                command: Some("git status".into()),
                ..RequirementTargets::default()
            },
            Priority::Medium,
        );
        let payload = engine.query(&req).await.unwrap();
        assert_eq!(payload[GIT_KEY]["command"], "git status");
        assert_eq!(payload[PROJECT_KEY]["name"], "ctxsync");
    }

    #[tokio::test]
    async fn empty_search_is_absent() {
        let mut source = MockContextSource::new();
        let _ = source.expect_search().returning(|_, _| Ok(Vec::new()));
        let (engine, _, _) = engine_with(source);
        let req = ContextRequirement::new(
            RequirementKind::SearchOperation,
            RequirementTargets {
                pattern: Some("TODO".into()),
                ..RequirementTargets::default()
            },
            Priority::Low,
        );
        assert!(engine.query(&req).await.is_none());
    }

    #[test]
    fn blocking_adapter_outside_runtime() {
        let mut source = MockContextSource::new();
        let _ = source
            .expect_fetch_task()
            .returning(|id| Ok(Some(task(id, "Fix bug"))));
        let _ = source.expect_search().returning(|_, _| Ok(Vec::new()));
        let (engine, _, _) = engine_with(source);
        let payload = engine.query_blocking(&mcp("T1")).unwrap();
        assert_eq!(payload[TASK_KEY]["title"], "Fix bug");
    }

    #[tokio::test]
    async fn blocking_adapter_inside_runtime() {
        let mut source = MockContextSource::new();
        let _ = source
            .expect_fetch_task()
            .returning(|id| Ok(Some(task(id, "Fix bug"))));
        let _ = source.expect_search().returning(|_, _| Ok(Vec::new()));
        let (engine, _, _) = engine_with(source);
        assert!(engine.query_blocking(&mcp("T1")).is_some());
    }

    #[test]
    fn documentation_terms() {
        assert_eq!(documentation_term("/repo/docs/README.md").as_deref(), Some("README"));
        assert_eq!(documentation_term("**/*.md"), None);
        assert_eq!(documentation_term("src/*cache*.rs").as_deref(), Some("cache"));
    }
}
