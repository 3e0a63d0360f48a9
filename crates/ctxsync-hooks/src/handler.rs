//! Hook handler trait.

use async_trait::async_trait;

use crate::errors::HookError;
use crate::types::{HookContext, HookExecutionMode, HookResult, HookType};

/// A lifecycle hook handler.
///
/// Higher [`priority`](HookHandler::priority) runs first. A declared
/// [`HookExecutionMode::Background`] is ignored for forced-blocking hook
/// types. Errors and timeouts are logged by the engine and treated as
/// `Continue`.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Unique name.
    fn name(&self) -> &str;

    /// Event this handler responds to.
    fn hook_type(&self) -> HookType;

    /// Execution priority. Default 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Preferred mode. Default blocking.
    fn execution_mode(&self) -> HookExecutionMode {
        HookExecutionMode::Blocking
    }

    /// Per-call ceiling in milliseconds. `None` uses the engine default.
    fn timeout_ms(&self) -> Option<u64> {
        None
    }

    /// Run the handler.
    async fn handle(&self, context: &HookContext) -> Result<HookResult, HookError>;

    /// Return `false` to skip this handler for `context`.
    fn should_handle(&self, _context: &HookContext) -> bool {
        true
    }
}
