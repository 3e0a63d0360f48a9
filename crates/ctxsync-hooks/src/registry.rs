//! Hook registry.
//!
//! Handlers are bucketed by [`HookType`] and kept sorted by priority,
//! highest first. Registering a name twice within a type replaces the
//! earlier handler.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::handler::HookHandler;
use crate::types::{HookInfo, HookType};

/// Registry of lifecycle hook handlers.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<HookType, Vec<Arc<dyn HookHandler>>>,
}

impl HookRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler`, replacing any same-named handler of the same type.
    pub fn register(&mut self, handler: Arc<dyn HookHandler>) {
        let hook_type = handler.hook_type();
        let name = handler.name().to_string();
        let handlers = self.hooks.entry(hook_type).or_default();
        handlers.retain(|h| h.name() != name);

        debug!(name = %name, hook_type = %hook_type, priority = handler.priority(), "registering hook");
        handlers.push(handler);
        // stable: equal priorities keep registration order
        handlers.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    /// Remove every handler called `name`. Returns whether one was found.
    pub fn unregister(&mut self, name: &str) -> bool {
        let mut found = false;
        for handlers in self.hooks.values_mut() {
            let before = handlers.len();
            handlers.retain(|h| h.name() != name);
            found |= handlers.len() < before;
        }
        if found {
            debug!(name, "unregistered hook");
        }
        found
    }

    /// Handlers for `hook_type`, highest priority first.
    #[must_use]
    pub fn get_handlers(&self, hook_type: HookType) -> Vec<Arc<dyn HookHandler>> {
        self.hooks.get(&hook_type).cloned().unwrap_or_default()
    }

    /// Summaries of all handlers, sorted by name.
    #[must_use]
    pub fn list_all(&self) -> Vec<HookInfo> {
        let mut infos: Vec<HookInfo> = self
            .hooks
            .values()
            .flatten()
            .map(|handler| HookInfo {
                name: handler.name().to_string(),
                hook_type: handler.hook_type(),
                priority: handler.priority(),
                execution_mode: handler.execution_mode(),
                timeout_ms: handler.timeout_ms(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Total handlers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.hooks.clear();
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hook_count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HookError;
    use crate::types::{HookContext, HookResult};
    use async_trait::async_trait;

    struct Named {
        name: &'static str,
        hook_type: HookType,
        priority: i32,
    }

    #[async_trait]
    impl HookHandler for Named {
        fn name(&self) -> &str {
            self.name
        }
        fn hook_type(&self) -> HookType {
            self.hook_type
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        async fn handle(&self, _: &HookContext) -> Result<HookResult, HookError> {
            Ok(HookResult::continue_())
        }
    }

    fn named(name: &'static str, hook_type: HookType, priority: i32) -> Arc<dyn HookHandler> {
        Arc::new(Named {
            name,
            hook_type,
            priority,
        })
    }

    #[test]
    fn handlers_sorted_by_priority_descending() {
        let mut registry = HookRegistry::new();
        registry.register(named("low", HookType::PreToolUse, 1));
        registry.register(named("high", HookType::PreToolUse, 10));
        registry.register(named("mid", HookType::PreToolUse, 5));
        let order: Vec<String> = registry
            .get_handlers(HookType::PreToolUse)
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn same_name_replaces() {
        let mut registry = HookRegistry::new();
        registry.register(named("capture", HookType::PostToolUse, 1));
        registry.register(named("capture", HookType::PostToolUse, 7));
        let handlers = registry.get_handlers(HookType::PostToolUse);
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].priority(), 7);
    }

    #[test]
    fn unregister_and_list() {
        let mut registry = HookRegistry::new();
        registry.register(named("b", HookType::Stop, 0));
        registry.register(named("a", HookType::PreToolUse, 0));
        let names: Vec<String> = registry.list_all().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert!(registry.unregister("b"));
        assert!(!registry.unregister("b"));
        assert_eq!(registry.count(), 1);
        assert!(registry.get_handlers(HookType::Stop).is_empty());

        registry.clear();
        assert_eq!(registry.count(), 0);
    }
}
