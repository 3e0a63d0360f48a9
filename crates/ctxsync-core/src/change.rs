//! The unit of synchronization.
//!
//! A [`ContextChange`] describes what a completed operation (or a direct
//! caller) altered on one context entity. Changes are consumed once applied.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ChangeId;
use crate::types::{ChangeOperation, ChangeSource, ContextType};

/// Open field map carried by changes and cached payloads.
pub type Fields = serde_json::Map<String, Value>;

/// Lowest change priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest change priority.
pub const MAX_PRIORITY: u8 = 5;
/// Priority assigned when none is given.
pub const DEFAULT_PRIORITY: u8 = 3;

/// `(context_type, entity_id)`: identifies a logical entity for collision purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictKey {
    /// Context level.
    pub context_type: ContextType,
    /// Entity identifier within that level.
    pub entity_id: String,
}

impl ConflictKey {
    /// Build a key.
    #[must_use]
    pub fn new(context_type: ContextType, entity_id: impl Into<String>) -> Self {
        Self {
            context_type,
            entity_id: entity_id.into(),
        }
    }

    /// Cache key of the entity entry, e.g. `task:T1`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.context_type, self.entity_id)
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.context_type, self.entity_id)
    }
}

/// A change to one context entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChange {
    /// Unique change identifier.
    pub change_id: ChangeId,
    /// When the change happened, fractional Unix seconds.
    pub timestamp: f64,
    /// Producer of the change.
    pub source: ChangeSource,
    /// What the change does.
    pub operation: ChangeOperation,
    /// Context level of the entity.
    pub context_type: ContextType,
    /// Entity identifier.
    pub entity_id: String,
    /// Changed fields.
    #[serde(default)]
    pub fields: Fields,
    /// Priority, `1..=5`.
    pub priority: u8,
    /// Whether this change should be synchronized promptly.
    pub requires_sync: bool,
}

impl ContextChange {
    /// Create a direct change with default priority and no fields.
    #[must_use]
    pub fn new(
        context_type: ContextType,
        entity_id: impl Into<String>,
        operation: ChangeOperation,
        timestamp: f64,
    ) -> Self {
        Self {
            change_id: ChangeId::new(),
            timestamp,
            source: ChangeSource::Direct,
            operation,
            context_type,
            entity_id: entity_id.into(),
            fields: Fields::new(),
            priority: DEFAULT_PRIORITY,
            requires_sync: true,
        }
    }

    /// Replace the field map.
    #[must_use]
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    /// Set one field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.fields.insert(key.into(), value);
        self
    }

    /// Set the priority, clamped to `1..=5`.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        self
    }

    /// Set the source.
    #[must_use]
    pub fn with_source(mut self, source: ChangeSource) -> Self {
        self.source = source;
        self
    }

    /// Set the explicit change ID.
    #[must_use]
    pub fn with_id(mut self, change_id: impl Into<ChangeId>) -> Self {
        self.change_id = change_id.into();
        self
    }

    /// Mark whether the change needs prompt synchronization.
    #[must_use]
    pub fn with_requires_sync(mut self, requires_sync: bool) -> Self {
        self.requires_sync = requires_sync;
        self
    }

    /// The conflict key of this change.
    #[must_use]
    pub fn conflict_key(&self) -> ConflictKey {
        ConflictKey::new(self.context_type, self.entity_id.clone())
    }
}
