//! Hooks that connect tool events to a [`ContextSyncEngine`].
//!
//! - [`ContextInjectionHook`] (`PreToolUse`): adds the context block for the
//!   upcoming call under the `injectedContext` modification key.
//! - [`ChangeCaptureHook`] (`PostToolUse`, background): classifies the
//!   finished call and queues the change.
//! - [`SyncFlushHook`] (`Stop`): drains the pending queue.

use std::sync::Arc;

use async_trait::async_trait;
use ctxsync_engine::ContextSyncEngine;
use serde_json::json;
use tracing::debug;

use crate::errors::HookError;
use crate::handler::HookHandler;
use crate::registry::HookRegistry;
use crate::types::{HookContext, HookExecutionMode, HookResult, HookType};

/// Modification key carrying the injected context block.
pub const INJECTED_CONTEXT_KEY: &str = "injectedContext";

/// Slack added to the engine's budget before the hook engine gives up.
const INJECTION_TIMEOUT_SLACK_MS: u64 = 100;

fn unexpected(name: &str, context: &HookContext) -> HookError {
    HookError::UnexpectedContext {
        name: name.to_string(),
        hook_type: context.hook_type(),
    }
}

/// Injects context before relevant tool calls.
#[derive(Debug, Clone)]
pub struct ContextInjectionHook {
    engine: Arc<ContextSyncEngine>,
}

impl ContextInjectionHook {
    /// Hook over `engine`.
    pub fn new(engine: Arc<ContextSyncEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl HookHandler for ContextInjectionHook {
    fn name(&self) -> &str {
        "context-injection"
    }

    fn hook_type(&self) -> HookType {
        HookType::PreToolUse
    }

    fn priority(&self) -> i32 {
        50
    }

    fn timeout_ms(&self) -> Option<u64> {
        Some(self.engine.settings().query.total_budget_ms + INJECTION_TIMEOUT_SLACK_MS)
    }

    fn should_handle(&self, context: &HookContext) -> bool {
        match context {
            HookContext::PreToolUse {
                tool_name,
                tool_arguments,
                ..
            } => self.engine.is_relevant(tool_name, tool_arguments),
            _ => false,
        }
    }

    async fn handle(&self, context: &HookContext) -> Result<HookResult, HookError> {
        let HookContext::PreToolUse {
            tool_name,
            tool_arguments,
            ..
        } = context
        else {
            return Err(unexpected(self.name(), context));
        };

        Ok(
            match self.engine.inject_context(tool_name, tool_arguments).await {
                Some(block) => HookResult::modify(json!({ INJECTED_CONTEXT_KEY: block })),
                None => HookResult::continue_(),
            },
        )
    }
}

/// Captures changes after tool calls, off the caller's path.
#[derive(Debug, Clone)]
pub struct ChangeCaptureHook {
    engine: Arc<ContextSyncEngine>,
}

impl ChangeCaptureHook {
    /// Hook over `engine`.
    pub fn new(engine: Arc<ContextSyncEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl HookHandler for ChangeCaptureHook {
    fn name(&self) -> &str {
        "change-capture"
    }

    fn hook_type(&self) -> HookType {
        HookType::PostToolUse
    }

    fn execution_mode(&self) -> HookExecutionMode {
        HookExecutionMode::Background
    }

    async fn handle(&self, context: &HookContext) -> Result<HookResult, HookError> {
        let HookContext::PostToolUse {
            tool_name,
            tool_arguments,
            result,
            ..
        } = context
        else {
            return Err(unexpected(self.name(), context));
        };

        let classification = self
            .engine
            .capture_change(tool_name, tool_arguments, result.as_ref())
            .await;
        Ok(match classification.into_change() {
            Some(change) => HookResult::continue_with_message(format!(
                "captured {} {}",
                change.operation,
                change.conflict_key()
            )),
            None => HookResult::continue_(),
        })
    }
}

/// Synchronizes whatever is still queued when the host stops.
#[derive(Debug, Clone)]
pub struct SyncFlushHook {
    engine: Arc<ContextSyncEngine>,
}

impl SyncFlushHook {
    /// Hook over `engine`.
    pub fn new(engine: Arc<ContextSyncEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl HookHandler for SyncFlushHook {
    fn name(&self) -> &str {
        "sync-flush"
    }

    fn hook_type(&self) -> HookType {
        HookType::Stop
    }

    async fn handle(&self, _context: &HookContext) -> Result<HookResult, HookError> {
        let outcome = self.engine.sync_pending().await;
        if !outcome.success {
            return Err(HookError::Handler {
                name: self.name().to_string(),
                message: outcome.error.unwrap_or_else(|| "sync failed".to_string()),
            });
        }
        debug!(applied = outcome.applied, "pending changes flushed");
        Ok(HookResult::continue_with_message(format!(
            "synchronized {} change(s)",
            outcome.applied
        )))
    }
}

/// Register all three hooks over `engine`.
pub fn register_context_hooks(registry: &mut HookRegistry, engine: &Arc<ContextSyncEngine>) {
    registry.register(Arc::new(ContextInjectionHook::new(Arc::clone(engine))));
    registry.register(Arc::new(ChangeCaptureHook::new(Arc::clone(engine))));
    registry.register(Arc::new(SyncFlushHook::new(Arc::clone(engine))));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionContexts;
    use ctxsync_core::{ManualClock, TaskRecord};
    use ctxsync_engine::InMemorySource;
    use ctxsync_settings::ContextSyncSettings;

    fn engine() -> Arc<ContextSyncEngine> {
        let source = Arc::new(InMemorySource::new());
        source.put_task(TaskRecord {
            id: "T1".into(),
            title: "Fix bug".into(),
            ..TaskRecord::default()
        });
        Arc::new(ContextSyncEngine::with_clock(
            ContextSyncSettings::default(),
            source,
            Arc::new(ManualClock::default()),
        ))
    }

    #[tokio::test]
    async fn injection_adds_context_block() {
        let hook = ContextInjectionHook::new(engine());
        let ctx = SessionContexts::new("s1").pre_tool_use(
            "manage_task",
            json!({"action": "get", "task_id": "T1"}),
            "c1",
        );
        assert!(hook.should_handle(&ctx));
        let result = hook.handle(&ctx).await.unwrap();
        let block = result.modifications.unwrap()[INJECTED_CONTEXT_KEY]
            .as_str()
            .unwrap()
            .to_string();
        assert!(block.contains("Fix bug"));
        assert_eq!(hook.timeout_ms(), Some(600));
    }

    #[tokio::test]
    async fn injection_skips_irrelevant_calls() {
        let hook = ContextInjectionHook::new(engine());
        let ctx = SessionContexts::new("s1").pre_tool_use("WebFetch", json!({"url": "x"}), "c1");
        assert!(!hook.should_handle(&ctx));
    }

    #[tokio::test]
    async fn capture_queues_low_priority_change() {
        let engine = engine();
        let hook = ChangeCaptureHook::new(Arc::clone(&engine));
        let ctx = SessionContexts::new("s1").post_tool_use(
            "Edit",
            json!({"file_path": "README.md"}),
            "c1",
            Some(json!({"success": true})),
            5,
        );
        let result = hook.handle(&ctx).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("captured update project:current"));
        assert_eq!(engine.coordinator().pending_len(), 1);
    }

    #[tokio::test]
    async fn wrong_context_is_an_error() {
        let hook = ChangeCaptureHook::new(engine());
        let err = hook.handle(&SessionContexts::new("s1").stop("done")).await.unwrap_err();
        assert_eq!(err.category(), "unexpected_context");
    }

    #[tokio::test]
    async fn flush_drains_queue() {
        let engine = engine();
        let _ = engine
            .capture_change("Write", &json!({"file_path": "docs/a.md"}), None)
            .await;
        assert_eq!(engine.coordinator().pending_len(), 1);

        let result = SyncFlushHook::new(Arc::clone(&engine))
            .handle(&SessionContexts::new("s1").stop("done"))
            .await
            .unwrap();
        assert_eq!(result.message.as_deref(), Some("synchronized 1 change(s)"));
        assert_eq!(engine.coordinator().pending_len(), 0);
    }

    #[test]
    fn registers_all_three() {
        let mut registry = HookRegistry::new();
        register_context_hooks(&mut registry, &engine());
        assert_eq!(registry.count(), 3);
        assert_eq!(registry.get_handlers(HookType::Stop).len(), 1);
    }
}
