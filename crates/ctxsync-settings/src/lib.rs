//! # ctxsync-settings
//!
//! Layered configuration for the context synchronization engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ContextSyncSettings::default()`]
//! 2. **User file**: `~/.ctxsync/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CTXSYNC_*` overrides (highest priority)
//!
//! There is no process-global instance: load once at startup and hand the
//! value to the engine constructor.
//!
//! ```no_run
//! let settings = ctxsync_settings::load_settings().unwrap_or_default();
//! println!("sync timeout: {}ms", settings.sync.sync_timeout_ms);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    resolve_settings_path, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ctxsync_core::ConflictStrategy;

    #[test]
    fn re_exports_work() {
        let _settings = ContextSyncSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = ContextSyncSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.version, "0.1.0");
        assert_eq!(settings.query.fetch_timeout_ms, 400);
        assert_eq!(settings.query.total_budget_ms, 500);
        assert_eq!(settings.query.related_tasks_limit, 3);
        assert!((settings.sync.conflict_window_secs - 5.0).abs() < f64::EPSILON);
        assert_eq!(settings.sync.strategy, ConflictStrategy::LatestWins);
        assert_eq!(settings.sync.sync_timeout_ms, 2000);
        assert_eq!(settings.sync.resolution_history_limit, 100);
        assert_eq!(settings.audit.max_entries, 200);
        assert_eq!(settings.logging.level, "warn");
    }
}
