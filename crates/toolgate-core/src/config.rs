//! # Runtime Configuration
//!
//! Failure-policy choices that must be explicit rather than an accident of
//! implementation: what to do when the counter store is unreachable, and
//! whether audit failures are fatal.
//!
//! Loaded from the environment via [`GateConfig::from_env`] or deserialized
//! from a YAML/JSON file by the CLI.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sanitize::DEFAULT_MAX_DEPTH;

/// Behavior when a backing store (rate-limit counters) fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailureMode {
    /// Skip the failed check and continue evaluating.
    Open,
    /// Deny the request with `unknown_error`.
    #[default]
    Closed,
}

impl StoreFailureMode {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for StoreFailureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoreFailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "fail_open" | "fail-open" => Ok(Self::Open),
            "closed" | "fail_closed" | "fail-closed" => Ok(Self::Closed),
            other => Err(format!("expected open or closed, got {other}")),
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// What to do when the counter store fails.
    pub store_failure_mode: StoreFailureMode,
    /// Treat security-event audit failures as fatal for the request.
    pub strict_audit: bool,
    /// Offset from UTC, in minutes, used to evaluate time windows.
    pub utc_offset_minutes: i32,
    /// Maximum nesting depth kept when sanitizing request fields.
    pub max_field_depth: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            store_failure_mode: StoreFailureMode::Closed,
            strict_audit: false,
            utc_offset_minutes: 0,
            max_field_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl GateConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `TOOLGATE_STORE_FAILURE_MODE` (`open` | `closed`, default: `closed`)
    /// - `TOOLGATE_STRICT_AUDIT` (`true` | `false`, default: `false`)
    /// - `TOOLGATE_UTC_OFFSET_MINUTES` (default: `0`)
    /// - `TOOLGATE_MAX_FIELD_DEPTH` (default: `8`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            store_failure_mode: parse_var(
                &lookup,
                "TOOLGATE_STORE_FAILURE_MODE",
                defaults.store_failure_mode,
            )?,
            strict_audit: parse_var(&lookup, "TOOLGATE_STRICT_AUDIT", defaults.strict_audit)?,
            utc_offset_minutes: parse_var(
                &lookup,
                "TOOLGATE_UTC_OFFSET_MINUTES",
                defaults.utc_offset_minutes,
            )?,
            max_field_depth: parse_var(
                &lookup,
                "TOOLGATE_MAX_FIELD_DEPTH",
                defaults.max_field_depth,
            )?,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
