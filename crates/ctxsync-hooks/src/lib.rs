//! # ctxsync-hooks
//!
//! Lifecycle hooks that put the context synchronization engine in a tool
//! host's path.
//!
//! Handlers fire at [`PreToolUse`](types::HookType::PreToolUse),
//! [`PostToolUse`](types::HookType::PostToolUse), and
//! [`Stop`](types::HookType::Stop). Blocking handlers run in priority order
//! and may block or modify the call; background handlers are spawned and
//! tracked for draining. `PreToolUse` is always blocking.
//!
//! Hook errors never stop the host. They are logged and treated as
//! `Continue`.
//!
//! [`context_hooks::register_context_hooks`] installs injection, capture, and
//! flush handlers over one engine.

#![deny(unsafe_code)]

pub mod background;
pub mod context_hooks;
pub mod engine;
pub mod errors;
pub mod handler;
pub mod registry;
pub mod types;

pub use context_hooks::{
    ChangeCaptureHook, ContextInjectionHook, INJECTED_CONTEXT_KEY, SyncFlushHook,
    register_context_hooks,
};
pub use engine::HookEngine;
pub use errors::HookError;
pub use handler::HookHandler;
pub use registry::HookRegistry;
pub use types::{HookAction, HookContext, HookExecutionMode, HookResult, HookType, SessionContexts};
