//! `ContextSyncEngine`: every component wired from one settings value.
//!
//! The engine is built once at process start and handed to whoever needs it.
//! There is no global instance.

use std::sync::Arc;

use ctxsync_core::{ContextChange, ContextRequirement, Fields, SharedClock, SystemClock};
use ctxsync_settings::ContextSyncSettings;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::audit::{AuditEntry, AuditOperation, AuditSink, InMemoryAuditLog, NoopAuditSink};
use crate::cache::ContextCache;
use crate::classifier::{Classification, OperationClassifier};
use crate::coordinator::{ChangePublisher, SyncCoordinator, SyncOutcome};
use crate::detector::RelevanceDetector;
use crate::formatter::format_context;
use crate::query::QueryEngine;
use crate::source::ContextSource;

/// Context synchronization engine.
pub struct ContextSyncEngine {
    settings: ContextSyncSettings,
    clock: SharedClock,
    cache: Arc<ContextCache>,
    detector: RelevanceDetector,
    classifier: OperationClassifier,
    query: QueryEngine,
    coordinator: Arc<SyncCoordinator>,
    audit_log: Option<Arc<InMemoryAuditLog>>,
    audit_sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for ContextSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSyncEngine")
            .field("cache", &self.cache)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl ContextSyncEngine {
    /// Engine on the system clock.
    pub fn new(settings: ContextSyncSettings, source: Arc<dyn ContextSource>) -> Self {
        Self::with_clock(settings, source, Arc::new(SystemClock))
    }

    /// Engine on an explicit clock.
    pub fn with_clock(
        settings: ContextSyncSettings,
        source: Arc<dyn ContextSource>,
        clock: SharedClock,
    ) -> Self {
        let cache = Arc::new(ContextCache::new(Arc::clone(&clock), settings.cache.ttl.clone()));
        let query = QueryEngine::new(Arc::clone(&cache), source, settings.query.clone());
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&cache),
            settings.sync.clone(),
            Arc::clone(&clock),
        ));
        let audit_log = settings
            .audit
            .enabled
            .then(|| Arc::new(InMemoryAuditLog::new(settings.audit.max_entries)));
        let audit_sink: Arc<dyn AuditSink> = match &audit_log {
            Some(log) => Arc::clone(log) as Arc<dyn AuditSink>,
            None => Arc::new(NoopAuditSink),
        };

        Self {
            settings,
            clock,
            cache,
            detector: RelevanceDetector::default(),
            classifier: OperationClassifier::default(),
            query,
            coordinator,
            audit_log,
            audit_sink,
        }
    }

    /// Route audit entries to `sink` instead of the in-memory log.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_log = None;
        self.audit_sink = sink;
        self
    }

    /// Attach a publisher for resolved batches.
    ///
    /// Must be called before the coordinator is shared; otherwise the
    /// publisher is ignored with a warning.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn ChangePublisher>) -> Self {
        match Arc::try_unwrap(self.coordinator) {
            Ok(coordinator) => {
                self.coordinator = Arc::new(coordinator.with_publisher(publisher));
            }
            Err(shared) => {
                warn!("coordinator already shared, publisher not attached");
                self.coordinator = shared;
            }
        }
        self
    }

    /// Settings the engine was built from.
    pub fn settings(&self) -> &ContextSyncSettings {
        &self.settings
    }

    /// Shared cache.
    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// Synchronization coordinator.
    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Relevance detector.
    pub fn detector(&self) -> &RelevanceDetector {
        &self.detector
    }

    /// Operation classifier.
    pub fn classifier(&self) -> &OperationClassifier {
        &self.classifier
    }

    /// Query engine.
    pub fn query_engine(&self) -> &QueryEngine {
        &self.query
    }

    /// In-memory audit log, when enabled and not replaced.
    pub fn audit_log(&self) -> Option<&Arc<InMemoryAuditLog>> {
        self.audit_log.as_ref()
    }

    /// Whether `tool` called with `params` needs context.
    pub fn is_relevant(&self, tool: &str, params: &Value) -> bool {
        self.detector.is_relevant(tool, params)
    }

    /// Cached, time-boxed query.
    pub async fn query(&self, requirement: &ContextRequirement) -> Option<Fields> {
        self.query.query(requirement).await
    }

    /// Context block for an upcoming call, or `None` when the call needs no
    /// context or none could be gathered within `query.totalBudgetMs`.
    #[instrument(skip_all, fields(tool = %tool))]
    pub async fn inject_context(&self, tool: &str, params: &Value) -> Option<String> {
        let requirement = self.detector.detect(tool, params).into_requirement()?;
        let budget = self.settings.query.total_budget();

        let payload = if let Ok(payload) = tokio::time::timeout(budget, self.query.query(&requirement)).await {
            payload
        } else {
            warn!(budget_ms = self.settings.query.total_budget_ms, "context injection over budget");
            None
        };
        let block = payload
            .as_ref()
            .and_then(|p| format_context(p, self.settings.query.related_tasks_limit));

        self.audit_sink.record(
            AuditEntry::new(self.clock.now(), tool, AuditOperation::Inject, block.is_some())
                .with_summary(requirement.summary())
                .with_arguments(params),
        );
        block
    }

    /// Classify a completed call and queue the change it made.
    ///
    /// High-priority changes that require synchronization are synchronized
    /// before this returns.
    #[instrument(skip_all, fields(tool = %tool))]
    pub async fn capture_change(
        &self,
        tool: &str,
        params: &Value,
        result: Option<&Value>,
    ) -> Classification {
        let classification = self.classifier.classify(tool, params, result, self.clock.now());
        let Classification::Change(change) = &classification else {
            return classification;
        };

        self.audit_sink.record(
            AuditEntry::new(self.clock.now(), tool, AuditOperation::Capture, true)
                .with_summary(format!("{} {}", change.operation, change.conflict_key()))
                .with_arguments(params),
        );

        let immediate = self.coordinator.needs_immediate_sync(change);
        let _ = self.coordinator.add_change(change.clone());
        if immediate {
            debug!(entity = %change.entity_id, priority = change.priority, "immediate sync");
            let _ = self.sync_pending().await;
        }
        classification
    }

    /// Queue a change without synchronizing.
    pub fn add_change(&self, change: ContextChange) -> Option<ContextChange> {
        self.coordinator.add_change(change)
    }

    /// Synchronize `changes` now.
    pub async fn sync(&self, changes: Vec<ContextChange>) -> SyncOutcome {
        let outcome = self.coordinator.sync(changes).await;
        self.record_sync(&outcome);
        outcome
    }

    /// Drain and synchronize the pending queue.
    pub async fn sync_pending(&self) -> SyncOutcome {
        let outcome = self.coordinator.sync_pending().await;
        if outcome.received > 0 {
            self.record_sync(&outcome);
        }
        outcome
    }

    /// Start the periodic drain task.
    pub fn spawn_periodic_sync(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.coordinator.spawn_periodic_sync(cancel)
    }

    fn record_sync(&self, outcome: &SyncOutcome) {
        let mut summary = format!(
            "received={} applied={} conflicts={}",
            outcome.received, outcome.applied, outcome.conflicts_detected
        );
        if let Some(error) = &outcome.error {
            summary.push_str(" error=");
            summary.push_str(error);
        }
        self.audit_sink.record(
            AuditEntry::new(self.clock.now(), "", AuditOperation::Sync, outcome.success)
                .with_summary(summary),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use ctxsync_core::{ChangeOperation, ContextType, ManualClock, TaskRecord};
    use serde_json::json;

    fn engine() -> (ContextSyncEngine, Arc<InMemorySource>) {
        let source = Arc::new(InMemorySource::new());
        source.put_task(TaskRecord {
            id: "T1".into(),
            title: "Fix bug".into(),
            status: Some("in_progress".into()),
            ..TaskRecord::default()
        });
        let engine = ContextSyncEngine::with_clock(
            ContextSyncSettings::default(),
            source.clone(),
            Arc::new(ManualClock::default()),
        );
        (engine, source)
    }

    #[tokio::test]
    async fn injects_task_block() {
        let (engine, _) = engine();
        let block = engine
            .inject_context("manage_task", &json!({"action": "get", "task_id": "T1"}))
            .await
            .unwrap();
        assert!(block.contains("## Current Task"));
        assert!(block.contains("Fix bug"));

        let log = engine.audit_log().unwrap();
        let entries = log.entries(None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation_type, AuditOperation::Inject);
        assert!(entries[0].success);
    }

    #[tokio::test]
    async fn irrelevant_call_is_silent() {
        let (engine, source) = engine();
        assert!(engine.inject_context("WebFetch", &json!({"url": "x"})).await.is_none());
        assert_eq!(source.calls(), 0);
        assert!(engine.audit_log().unwrap().is_empty());
    }

    #[tokio::test]
    async fn high_priority_capture_syncs_immediately() {
        let (engine, _) = engine();
        let classification = engine
            .capture_change(
                "manage_task",
                &json!({"action": "complete", "task_id": "T1"}),
                Some(&json!({"success": true})),
            )
            .await;
        let change = classification.into_change().unwrap();
        assert!(engine.coordinator().needs_immediate_sync(&change));
        assert_eq!(engine.coordinator().pending_len(), 0);
        assert_eq!(engine.cache().get("task:T1").unwrap()["status"], "done");
    }

    #[tokio::test]
    async fn low_priority_capture_waits_in_queue() {
        let (engine, _) = engine();
        let classification = engine
            .capture_change(
                "Write",
                &json!({"file_path": "docs/guide.md", "content": "x"}),
                Some(&json!({"success": true})),
            )
            .await;
        assert!(!classification.is_unknown());
        assert_eq!(engine.coordinator().pending_len(), 1);

        let outcome = engine.sync_pending().await;
        assert!(outcome.success);
        assert_eq!(engine.coordinator().pending_len(), 0);
    }

    #[tokio::test]
    async fn failed_tool_call_captures_nothing() {
        let (engine, _) = engine();
        let classification = engine
            .capture_change(
                "manage_task",
                &json!({"action": "update", "task_id": "T1"}),
                Some(&json!({"success": false, "error": "not found"})),
            )
            .await;
        assert!(classification.is_unknown());
        assert_eq!(engine.coordinator().pending_len(), 0);
    }

    #[tokio::test]
    async fn sync_is_audited() {
        let (engine, _) = engine();
        let _ = engine
            .sync(vec![ContextChange::new(
                ContextType::Task,
                "T9",
                ChangeOperation::Create,
                1.0,
            )])
            .await;
        let stats = engine.audit_log().unwrap().stats();
        assert_eq!(stats.by_operation[&AuditOperation::Sync], 1);
    }

    #[tokio::test]
    async fn disabled_audit_records_nothing() {
        let mut settings = ContextSyncSettings::default();
        settings.audit.enabled = false;
        let engine = ContextSyncEngine::new(settings, Arc::new(InMemorySource::new()));
        assert!(engine.audit_log().is_none());
        let _ = engine.inject_context("manage_task", &json!({"action": "get", "task_id": "T1"})).await;
    }
}
