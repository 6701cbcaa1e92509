//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PulseSettings::default()`]
//! 2. If `~/.pulse/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{pulse_home, PulseSettings};

/// Resolve the path to the settings file (`~/.pulse/settings.json`).
pub fn settings_path() -> PathBuf {
    pulse_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PulseSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, or the merged result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<PulseSettings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Same as [`load_settings_from_path`], reading overrides through `lookup`.
pub fn load_settings_with<F>(path: &Path, lookup: F) -> Result<PulseSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(PulseSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PulseSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
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

/// Apply overrides read through `lookup`.
///
/// Integers must parse and fall within range, otherwise the value is
/// ignored with a warning and the file/default value stands. Empty strings
/// count as unset.
pub fn apply_overrides<F>(settings: &mut PulseSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("PULSE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("PULSE_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("PULSE_DB_PATH") {
        settings.server.database_path = PathBuf::from(v);
    }
    if let Some(v) = env.u64("PULSE_REQUEST_TIMEOUT_SECS", 1, 600) {
        settings.server.request_timeout_secs = v;
    }
    if let Some(v) = env.string("ADMINS_BASIC_AUTH_TOKEN") {
        settings.server.admin_token = Some(SecretString::from(v));
    }

    // ── Rate limit ──────────────────────────────────────────────────
    if let Some(v) = env.u64("PULSE_RATE_LIMIT_WINDOW_SECS", 1, 86_400) {
        settings.rate_limit.window_secs = v;
    }
    if let Some(v) = env.u32("PULSE_RATE_LIMIT_MAX_REQUESTS", 1, 1_000_000) {
        settings.rate_limit.max_requests = v;
    }

    // ── Generator ───────────────────────────────────────────────────
    if let Some(v) = env.string("OPENROUTER_API_KEY") {
        settings.generator.api_key = Some(SecretString::from(v));
    }
    if let Some(v) = env.string("OPENROUTER_BASE_URL") {
        settings.generator.base_url = v;
    }
    if let Some(v) = env.string("OPENROUTER_MODEL") {
        settings.generator.model = v;
    }

    // ── Telemetry ───────────────────────────────────────────────────
    if let Some(v) = env.string("PULSE_LOG_LEVEL") {
        settings.telemetry.log_level = v;
    }
    if let Some(v) = env.string("PULSE_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.telemetry.log_format = format,
            Err(_) => tracing::warn!(key = "PULSE_LOG_FORMAT", value = %v, "invalid log format env var, ignoring"),
        }
    }
    if let Some(v) = env.bool("PULSE_METRICS_ENABLED") {
        settings.telemetry.metrics_enabled = v;
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

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str) -> Option<String> {
        self.raw(name)
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.raw(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.raw(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = self.raw(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.raw(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}
