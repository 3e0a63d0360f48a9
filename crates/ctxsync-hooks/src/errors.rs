//! Hook error types.

use thiserror::Error;

/// Hook execution failures. The engine logs these and continues.
#[derive(Debug, Error)]
pub enum HookError {
    /// Handler exceeded its timeout.
    #[error("hook timed out after {timeout_ms}ms: {name}")]
    Timeout {
        /// Handler name.
        name: String,
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Handler reported a failure.
    #[error("hook handler error in '{name}': {message}")]
    Handler {
        /// Handler name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Context variant the handler cannot process.
    #[error("hook '{name}' cannot handle {hook_type} events")]
    UnexpectedContext {
        /// Handler name.
        name: String,
        /// Event type received.
        hook_type: crate::types::HookType,
    },
}

impl HookError {
    /// Stable category label for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Handler { .. } => "handler",
            Self::UnexpectedContext { .. } => "unexpected_context",
        }
    }
}
