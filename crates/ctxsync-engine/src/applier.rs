//! Turning resolved changes into cache writes.
//!
//! Applying is split in two. [`ChangeApplier::stage`] validates each change
//! and produces cache operations without touching the cache; a change that
//! fails validation is logged and skipped while the rest of the batch goes
//! on. [`ChangeApplier::commit`] hands the staged operations to the cache as
//! one atomic batch. The coordinator commits only when a cycle finishes
//! inside its deadline.

use std::sync::Arc;

use ctxsync_core::change::{MAX_PRIORITY, MIN_PRIORITY};
use ctxsync_core::{ChangeId, ChangeOperation, ContextChange, ContextType};
use serde_json::Value;
use tracing::warn;

use crate::cache::{BatchSummary, CacheOp, ContextCache};
use crate::errors::ApplyError;

/// Change fields that name the parent task of a subtask.
const PARENT_TASK_FIELDS: &[&str] = &["task_id", "parent_task_id"];

/// Validated cache operations for a batch of changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StagedBatch {
    /// Operations in application order.
    pub ops: Vec<CacheOp>,
    /// Changes that staged cleanly.
    pub applied: Vec<ContextChange>,
    /// Changes that were rejected, with the reason.
    pub failed: Vec<(ChangeId, ApplyError)>,
}

impl StagedBatch {
    /// Whether nothing staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Writes resolved changes into the shared cache.
#[derive(Debug, Clone)]
pub struct ChangeApplier {
    cache: Arc<ContextCache>,
}

impl ChangeApplier {
    /// Applier over `cache`.
    pub fn new(cache: Arc<ContextCache>) -> Self {
        Self { cache }
    }

    /// Stage every change, skipping (and logging) the ones that fail.
    pub fn stage(&self, changes: &[ContextChange], synced_at: f64) -> StagedBatch {
        let mut batch = StagedBatch::default();
        for change in changes {
            match self.stage_change(change, synced_at) {
                Ok(ops) => {
                    batch.ops.extend(ops);
                    batch.applied.push(change.clone());
                }
                Err(err) => {
                    warn!(change_id = %change.change_id, error = %err, "change rejected");
                    batch.failed.push((change.change_id.clone(), err));
                }
            }
        }
        batch
    }

    /// Cache operations for one change.
    pub fn stage_change(
        &self,
        change: &ContextChange,
        synced_at: f64,
    ) -> Result<Vec<CacheOp>, ApplyError> {
        validate(change)?;

        let key = change.conflict_key().cache_key();
        let dependents = CacheOp::InvalidateDependents {
            entity_key: key.clone(),
        };
        let mut ops = vec![match change.operation {
            ChangeOperation::Delete => CacheOp::Delete { key },
            ChangeOperation::Create | ChangeOperation::Update | ChangeOperation::Sync => {
                CacheOp::Merge {
                    key,
                    fields: change.fields.clone(),
                    ttl: self.cache.ttl_for(change.context_type),
                    synced_at,
                }
            }
        }];
        ops.push(dependents);
        ops.extend(
            derived_patterns(change)
                .into_iter()
                .map(|pattern| CacheOp::Invalidate { pattern }),
        );
        Ok(ops)
    }

    /// Commit a staged batch atomically.
    pub fn commit(&self, batch: StagedBatch) -> BatchSummary {
        self.cache.apply_batch(batch.ops)
    }

    /// Stage and commit immediately, for direct callers outside a sync cycle.
    pub fn apply(&self, changes: &[ContextChange]) -> StagedBatch {
        let staged = self.stage(changes, self.cache.now());
        let _ = self.cache.apply_batch(staged.ops.clone());
        staged
    }
}

fn validate(change: &ContextChange) -> Result<(), ApplyError> {
    if change.entity_id.trim().is_empty() {
        return Err(ApplyError::EmptyEntityId {
            change_id: change.change_id.clone(),
        });
    }
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&change.priority) {
        return Err(ApplyError::PriorityOutOfRange {
            change_id: change.change_id.clone(),
            priority: change.priority,
        });
    }
    Ok(())
}

/// Query-result key patterns made stale by `change`.
pub fn derived_patterns(change: &ContextChange) -> Vec<String> {
    let id = &change.entity_id;
    match change.context_type {
        ContextType::Task => vec![format!("query:task:{id}:*")],
        ContextType::Subtask => PARENT_TASK_FIELDS
            .iter()
            .find_map(|f| change.fields.get(*f).and_then(Value::as_str))
            .map(|parent| vec![format!("query:task:{parent}:*")])
            .unwrap_or_default(),
        ContextType::Branch => vec![format!("query:branch:{id}:*"), "query:git:*".to_string()],
        ContextType::Project | ContextType::Global => vec!["query:*".to_string()],
    }
}
