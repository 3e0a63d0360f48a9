//! # ctxsync-core
//!
//! Foundation types shared by every crate of the context synchronization engine.
//!
//! - **Branded IDs**: [`ChangeId`], [`CycleId`]
//! - **Closed enums**: [`ContextType`], [`ChangeOperation`], [`ChangeSource`],
//!   [`Priority`], [`RequirementKind`], [`ConflictStrategy`]
//! - **Changes**: [`ContextChange`] and its [`ConflictKey`]
//! - **Requirements**: [`ContextRequirement`] with canonical hashing
//! - **Remote records**: task, branch, project, and search records
//! - **Clocks**: [`Clock`] with a system and a manual implementation

#![deny(unsafe_code)]

pub mod change;
pub mod clock;
pub mod ids;
pub mod records;
pub mod requirement;
pub mod text;
pub mod types;

pub use change::{ConflictKey, ContextChange, Fields};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use ids::{ChangeId, CycleId};
pub use records::{BranchRecord, ProjectRecord, SearchRecord, TaskRecord};
pub use requirement::{ContextRequirement, RequirementTargets};
pub use types::{
    ChangeOperation, ChangeSource, ConflictStrategy, ContextType, Priority, RequirementKind,
};
