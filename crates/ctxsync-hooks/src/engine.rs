//! Hook execution engine.
//!
//! Blocking handlers run one after another in priority order:
//! - `Block` stops the chain and is returned as is.
//! - `Modify` results are shallow-merged and the chain continues.
//! - `Continue` moves on.
//!
//! Background handlers are spawned on the [`BackgroundTracker`] after the
//! blocking chain finishes. A handler error or timeout is logged at warn and
//! counts as `Continue`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::background::BackgroundTracker;
use crate::errors::HookError;
use crate::handler::HookHandler;
use crate::registry::HookRegistry;
use crate::types::{HookAction, HookContext, HookExecutionMode, HookResult, HookType};

/// Timeout applied to handlers that do not set their own.
pub const DEFAULT_HOOK_TIMEOUT_MS: u64 = 30_000;

/// Runs registered handlers for lifecycle events.
pub struct HookEngine {
    registry: HookRegistry,
    background: BackgroundTracker,
}

impl HookEngine {
    /// Engine over `registry`.
    #[must_use]
    pub fn new(registry: HookRegistry) -> Self {
        Self {
            registry,
            background: BackgroundTracker::new(),
        }
    }

    /// Run every handler registered for `context`'s type.
    #[instrument(skip_all, fields(hook_type = %context.hook_type()))]
    pub async fn execute(&self, context: &HookContext) -> HookResult {
        let hook_type = context.hook_type();
        let handlers = self.registry.get_handlers(hook_type);
        if handlers.is_empty() {
            return HookResult::continue_();
        }

        let started = Instant::now();
        let (blocking, background): (Vec<_>, Vec<_>) = handlers
            .into_iter()
            .filter(|h| h.should_handle(context))
            .partition(|h| effective_mode(h.as_ref(), hook_type) == HookExecutionMode::Blocking);

        let result = self.execute_blocking(&blocking, context).await;
        for handler in background {
            self.spawn_background(handler, context.clone());
        }

        debug!(
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            blocked = result.is_blocked(),
            "hooks executed"
        );
        result
    }

    async fn execute_blocking(
        &self,
        handlers: &[Arc<dyn HookHandler>],
        context: &HookContext,
    ) -> HookResult {
        let mut modifications: Option<Value> = None;
        let mut messages: Vec<String> = Vec::new();

        for handler in handlers {
            let result = run_handler(handler.as_ref(), context).await;
            match result.action {
                HookAction::Block => {
                    debug!(
                        name = handler.name(),
                        reason = result.reason.as_deref().unwrap_or("(none)"),
                        "hook blocked operation"
                    );
                    return result;
                }
                HookAction::Modify => {
                    if let Some(mods) = &result.modifications {
                        modifications = Some(merge_json(modifications.as_ref(), mods));
                    }
                }
                HookAction::Continue => {}
            }
            if let Some(message) = result.message {
                messages.push(message);
            }
        }

        HookResult {
            action: if modifications.is_some() {
                HookAction::Modify
            } else {
                HookAction::Continue
            },
            reason: None,
            message: (!messages.is_empty()).then(|| messages.join("\n")),
            modifications,
        }
    }

    fn spawn_background(&self, handler: Arc<dyn HookHandler>, context: HookContext) {
        self.background.spawn(async move {
            let result = run_handler(handler.as_ref(), &context).await;
            debug!(name = handler.name(), action = ?result.action, "background hook finished");
        });
    }

    /// Wait for all background handlers.
    pub async fn wait_for_background(&self) {
        self.background.drain_all().await;
    }

    /// Wait for background handlers up to `timeout`. Returns whether all
    /// finished.
    pub async fn wait_for_background_with_timeout(&self, timeout: Duration) -> bool {
        self.background.drain_with_timeout(timeout).await
    }

    /// Background handlers still running.
    #[must_use]
    pub fn pending_background_count(&self) -> usize {
        self.background.pending_count()
    }

    /// Registry in use.
    #[must_use]
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Mutable registry.
    pub fn registry_mut(&mut self) -> &mut HookRegistry {
        &mut self.registry
    }
}

impl std::fmt::Debug for HookEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEngine")
            .field("registry", &self.registry)
            .field("background", &self.background)
            .finish()
    }
}

fn effective_mode(handler: &dyn HookHandler, hook_type: HookType) -> HookExecutionMode {
    if hook_type.is_forced_blocking() {
        HookExecutionMode::Blocking
    } else {
        handler.execution_mode()
    }
}

async fn run_handler(handler: &dyn HookHandler, context: &HookContext) -> HookResult {
    let timeout_ms = handler.timeout_ms().unwrap_or(DEFAULT_HOOK_TIMEOUT_MS);
    let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), handler.handle(context))
        .await
        .unwrap_or_else(|_| {
            Err(HookError::Timeout {
                name: handler.name().to_string(),
                timeout_ms,
            })
        });

    outcome.unwrap_or_else(|err| {
        warn!(name = handler.name(), category = err.category(), error = %err, "hook failed, continuing");
        HookResult::continue_()
    })
}

fn merge_json(base: Option<&Value>, overlay: &Value) -> Value {
    match (base, overlay) {
        (Some(Value::Object(base)), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                let _ = merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}
