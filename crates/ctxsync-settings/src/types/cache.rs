//! Cache settings.

use std::time::Duration;

use ctxsync_core::ContextType;
use serde::{Deserialize, Serialize};

/// Cache configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Time-to-live per context type.
    pub ttl: TtlSettings,
}

/// Time-to-live in seconds for each context type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TtlSettings {
    /// Task entries.
    pub task: u64,
    /// Subtask entries.
    pub subtask: u64,
    /// Branch entries.
    pub branch: u64,
    /// Project entries.
    pub project: u64,
    /// Global entries.
    pub global: u64,
}

impl TtlSettings {
    /// TTL for a context type.
    #[must_use]
    pub fn ttl_for(&self, context_type: ContextType) -> Duration {
        let secs = match context_type {
            ContextType::Task => self.task,
            ContextType::Subtask => self.subtask,
            ContextType::Branch => self.branch,
            ContextType::Project => self.project,
            ContextType::Global => self.global,
        };
        Duration::from_secs(secs)
    }
}

impl Default for TtlSettings {
    fn default() -> Self {
        let secs = |ty: ContextType| ty.default_ttl().as_secs();
        Self {
            task: secs(ContextType::Task),
            subtask: secs(ContextType::Subtask),
            branch: secs(ContextType::Branch),
            project: secs(ContextType::Project),
            global: secs(ContextType::Global),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_context_type_defaults() {
        let ttl = TtlSettings::default();
        for ty in ContextType::all() {
            assert_eq!(ttl.ttl_for(*ty), ty.default_ttl());
        }
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let ttl: TtlSettings = serde_json::from_str(r#"{"task": 60}"#).unwrap();
        assert_eq!(ttl.ttl_for(ContextType::Task), Duration::from_secs(60));
        assert_eq!(ttl.ttl_for(ContextType::Global), Duration::from_secs(7200));
    }
}
