//! Synchronization settings.

use std::time::Duration;

use ctxsync_core::ConflictStrategy;
use serde::{Deserialize, Serialize};

/// Conflict handling, queue bound, and cycle timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Maximum timestamp spread (seconds) within which same-key changes conflict.
    pub conflict_window_secs: f64,
    /// Resolution strategy for conflict sets.
    pub strategy: ConflictStrategy,
    /// Pending queue bound; the oldest change is evicted beyond it.
    pub max_pending_changes: usize,
    /// Ceiling for one synchronization cycle.
    pub sync_timeout_ms: u64,
    /// Period of the background drain task.
    pub sync_interval_ms: u64,
    /// Captured changes at or above this priority are synchronized immediately.
    pub immediate_sync_priority: u8,
    /// Resolution history entries kept for diagnostics.
    pub resolution_history_limit: usize,
}

impl SyncSettings {
    /// Cycle timeout as a [`Duration`].
    #[must_use]
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Drain period as a [`Duration`].
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            conflict_window_secs: 5.0,
            strategy: ConflictStrategy::LatestWins,
            max_pending_changes: 1000,
            sync_timeout_ms: 2000,
            sync_interval_ms: 5000,
            immediate_sync_priority: 4,
            resolution_history_limit: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_snake_case() {
        let s: SyncSettings =
            serde_json::from_str(r#"{"strategy": "merge_compatible"}"#).unwrap();
        assert_eq!(s.strategy, ConflictStrategy::MergeCompatible);
        assert!((s.conflict_window_secs - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn durations() {
        let s = SyncSettings::default();
        assert_eq!(s.sync_timeout(), Duration::from_secs(2));
        assert_eq!(s.sync_interval(), Duration::from_secs(5));
    }
}
