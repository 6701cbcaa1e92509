//! Settings types with compiled defaults.
//!
//! Secrets (`admin_token`, `api_key`) are never serialized, so they cannot
//! leak through a settings dump. They only enter through the settings file
//! or the environment.

use std::path::PathBuf;

use pulse_telemetry::LogFormat;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseSettings {
    pub server: ServerSettings,
    pub rate_limit: RateLimitSettings,
    pub generator: GeneratorSettings,
    pub telemetry: TelemetrySettings,
}

impl PulseSettings {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.window_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "rate_limit.window_secs must be > 0".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(SettingsError::InvalidValue(
                "rate_limit.max_requests must be > 0".into(),
            ));
        }
        if self.generator.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "generator.base_url must not be empty".into(),
            ));
        }
        if self.generator.model.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "generator.model must not be empty".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return Err(SettingsError::InvalidValue(format!(
                "generator.temperature must be within 0..=2, got {}",
                self.generator.temperature
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// Upper bound on a single outbound generation call.
    pub request_timeout_secs: u64,
    /// When unset, `GET /reviews` is open to anyone who can reach the
    /// service.
    #[serde(skip_serializing)]
    pub admin_token: Option<SecretString>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            database_path: pulse_home().join("database").join("pulse.db"),
            request_timeout_secs: 30,
            admin_token: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// When unset, every submission fails with a configuration error.
    #[serde(skip_serializing)]
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub connect_timeout_secs: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.4,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}

/// `~/.pulse`, falling back to `/tmp/.pulse` without a home directory.
pub fn pulse_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pulse")
}
