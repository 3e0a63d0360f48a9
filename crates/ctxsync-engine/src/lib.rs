//! # ctxsync-engine
//!
//! Real-time context synchronization between tool calls and a remote
//! context store.
//!
//! Before a call, the [`RelevanceDetector`] decides whether the call needs
//! context and the [`QueryEngine`] fetches it (cache first, 400 ms ceiling on
//! the network). After a call, the [`OperationClassifier`] turns the call into
//! a [`ContextChange`](ctxsync_core::ContextChange), and the
//! [`SyncCoordinator`] resolves conflicting changes and commits them to the
//! shared [`ContextCache`].
//!
//! [`ContextSyncEngine`] wires all of it from one settings value:
//!
//! ```text
//! inject_context ─► detector ─► query ─► cache | source ─► formatter
//! capture_change ─► classifier ─► queue ─► resolve ─► stage ─► publish ─► commit
//! ```
//!
//! No public entry point returns an error. Timeouts, source failures, and
//! rejected changes become `None`, [`Classification::Unknown`], or a failed
//! [`SyncOutcome`], and are logged.

#![deny(unsafe_code)]

pub mod applier;
pub mod audit;
pub mod cache;
pub mod classifier;
pub mod conflict;
pub mod coordinator;
pub mod detector;
pub mod engine;
pub mod errors;
pub mod formatter;
pub mod query;
pub mod source;

pub use applier::{ChangeApplier, StagedBatch};
pub use audit::{AuditEntry, AuditOperation, AuditSink, InMemoryAuditLog, NoopAuditSink};
pub use cache::{BatchSummary, CacheOp, CacheStats, CachedContext, ContextCache};
pub use classifier::{Classification, ClassificationRule, OperationClassifier};
pub use conflict::{ChangeGroup, ConflictResolver, Resolution, ResolutionRecord, detect_conflicts};
pub use coordinator::{
    ChangePublisher, SyncCoordinator, SyncEvent, SyncOutcome, SyncPhase, SyncStats,
};
pub use detector::{DetectionRule, Relevance, RelevanceDetector};
pub use engine::ContextSyncEngine;
pub use errors::{ApplyError, QueryError, SourceError, SyncError};
pub use formatter::format_context;
pub use query::QueryEngine;
pub use source::{ContextSource, InMemorySource};
