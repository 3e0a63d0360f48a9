//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ContextSyncSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `CTXSYNC_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ContextSyncSettings;

/// Resolve the settings file path.
///
/// `CTXSYNC_SETTINGS` wins; otherwise `~/.ctxsync/settings.json`.
pub fn settings_path() -> PathBuf {
    resolve_settings_path(|name| std::env::var(name).ok())
}

/// Resolve the settings file path through `lookup`.
pub fn resolve_settings_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };
    if let Some(explicit) = env.string("CTXSYNC_SETTINGS") {
        return PathBuf::from(explicit);
    }
    let home = env.string("HOME").unwrap_or_else(|| "/tmp".to_string());
    PathBuf::from(home).join(".ctxsync").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ContextSyncSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). Invalid
/// JSON or values that fail validation return an error.
pub fn load_settings_from_path(path: &Path) -> Result<ContextSyncSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<ContextSyncSettings> {
    let defaults = serde_json::to_value(ContextSyncSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CTXSYNC_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut ContextSyncSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules:
/// - Numbers must parse and fall within the documented range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_overrides<F>(settings: &mut ContextSyncSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Sync ────────────────────────────────────────────────────────
    if let Some(v) = env.string("CTXSYNC_STRATEGY") {
        match serde_json::from_value(Value::String(v.clone())) {
            Ok(strategy) => settings.sync.strategy = strategy,
            Err(_) => tracing::warn!(key = "CTXSYNC_STRATEGY", value = %v, "unknown strategy, ignoring"),
        }
    }
    if let Some(v) = env.f64("CTXSYNC_CONFLICT_WINDOW_SECS", 0.001, 3600.0) {
        settings.sync.conflict_window_secs = v;
    }
    if let Some(v) = env.usize("CTXSYNC_MAX_PENDING_CHANGES", 1, 1_000_000) {
        settings.sync.max_pending_changes = v;
    }
    if let Some(v) = env.u64("CTXSYNC_SYNC_TIMEOUT_MS", 1, 600_000) {
        settings.sync.sync_timeout_ms = v;
    }
    if let Some(v) = env.u64("CTXSYNC_SYNC_INTERVAL_MS", 10, 3_600_000) {
        settings.sync.sync_interval_ms = v;
    }

    // ── Query ───────────────────────────────────────────────────────
    if let Some(v) = env.u64("CTXSYNC_FETCH_TIMEOUT_MS", 1, 60_000) {
        settings.query.fetch_timeout_ms = v;
    }
    if let Some(v) = env.u64("CTXSYNC_TOTAL_BUDGET_MS", 1, 60_000) {
        settings.query.total_budget_ms = v;
    }

    // ── Audit / logging ─────────────────────────────────────────────
    if let Some(v) = env.bool("CTXSYNC_AUDIT_ENABLED") {
        settings.audit.enabled = v;
    }
    if let Some(v) = env.string("CTXSYNC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("CTXSYNC_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }

    fn f64(&self, name: &str, min: f64, max: f64) -> Option<f64> {
        let val = (self.lookup)(name)?;
        let result = parse_f64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid f64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
