//! # pulse-settings
//!
//! Layered configuration for the pulse feedback service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`PulseSettings::default()`]
//! 2. **User file** — `~/.pulse/settings.json` or `--config` (deep-merged over defaults)
//! 3. **Environment variables** — `PULSE_*`, `OPENROUTER_*` and
//!    `ADMINS_BASIC_AUTH_TOKEN` (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
