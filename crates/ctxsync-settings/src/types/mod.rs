//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format. Each type implements [`Default`] with production values, and
//! `#[serde(default)]` lets a partial file fill the rest from defaults.

mod cache;
mod query;
mod sync;

pub use cache::*;
pub use query::*;
pub use sync::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the context synchronization engine.
///
/// # JSON Format
///
/// ```json
/// {
///   "cache": { "ttl": { "task": 600 } },
///   "sync": { "strategy": "priority_based", "syncTimeoutMs": 1500 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSyncSettings {
    /// Settings schema version.
    pub version: String,
    /// Cache TTLs.
    pub cache: CacheSettings,
    /// Query latency budget and limits.
    pub query: QuerySettings,
    /// Conflict handling and cycle timing.
    pub sync: SyncSettings,
    /// Audit log.
    pub audit: AuditSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

impl Default for ContextSyncSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            cache: CacheSettings::default(),
            query: QuerySettings::default(),
            sync: SyncSettings::default(),
            audit: AuditSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ContextSyncSettings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let sync = &self.sync;
        if !(sync.conflict_window_secs.is_finite() && sync.conflict_window_secs > 0.0) {
            return Err(SettingsError::InvalidValue(format!(
                "sync.conflictWindowSecs must be positive, got {}",
                sync.conflict_window_secs
            )));
        }
        if sync.max_pending_changes == 0 {
            return Err(SettingsError::InvalidValue(
                "sync.maxPendingChanges must be at least 1".to_string(),
            ));
        }
        if sync.sync_timeout_ms == 0 || sync.sync_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "sync.syncTimeoutMs and sync.syncIntervalMs must be non-zero".to_string(),
            ));
        }
        if self.query.fetch_timeout_ms == 0 || self.query.total_budget_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "query.fetchTimeoutMs and query.totalBudgetMs must be non-zero".to_string(),
            ));
        }
        if self.audit.enabled && self.audit.max_entries == 0 {
            return Err(SettingsError::InvalidValue(
                "audit.maxEntries must be at least 1 when audit is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Audit log configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditSettings {
    /// Whether operations are recorded.
    pub enabled: bool,
    /// Entries kept; the oldest is dropped beyond this.
    pub max_entries: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 200,
        }
    }
}

/// Logging output configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_validate() {
        ContextSyncSettings::default().validate().unwrap();
    }

    #[test]
    fn zero_window_rejected() {
        let mut settings = ContextSyncSettings::default();
        settings.sync.conflict_window_secs = 0.0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn nan_window_rejected() {
        let mut settings = ContextSyncSettings::default();
        settings.sync.conflict_window_secs = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_queue_rejected() {
        let mut settings = ContextSyncSettings::default();
        settings.sync.max_pending_changes = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("maxPendingChanges"));
    }

    #[test]
    fn zero_fetch_timeout_rejected() {
        let mut settings = ContextSyncSettings::default();
        settings.query.fetch_timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn disabled_audit_may_have_zero_entries() {
        let mut settings = ContextSyncSettings::default();
        settings.audit.enabled = false;
        settings.audit.max_entries = 0;
        settings.validate().unwrap();
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(ContextSyncSettings::default()).unwrap();
        assert_eq!(json["sync"]["syncTimeoutMs"], 2000);
        assert_eq!(json["sync"]["strategy"], "latest_wins");
        assert_eq!(json["query"]["fetchTimeoutMs"], 400);
        assert_eq!(json["cache"]["ttl"]["project"], 3600);
        assert_eq!(json["audit"]["maxEntries"], 200);
    }
}
