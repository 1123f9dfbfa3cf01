//! Settings keys, validation and application.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use anyhow::Result;

use dockhand_common::Settings;
use dockhand_common::settings::{COMMAND_TIMEOUT_RANGE, SSH_CONCURRENCY_RANGE};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "ssh_concurrency",
    "command_timeout_secs",
    "connect_timeout_secs",
    "proxy.enabled",
    "proxy.http",
    "proxy.https",
    "proxy.no_proxy",
    "proxy.local_only",
    "registry.enabled",
    "registry.server",
    "registry.username",
    "registry.password",
];

const BOOL_KEYS: &[&str] = &["proxy.enabled", "proxy.local_only", "registry.enabled"];
const INTEGER_KEYS: &[&str] = &["ssh_concurrency", "command_timeout_secs", "connect_timeout_secs"];

/// Keys whose values are never echoed back.
pub const SECRET_KEYS: &[&str] = &["registry.password"];

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a settings key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a value for the given key.
///
/// Booleans accept `true`/`false`; numeric keys accept non-negative integers
/// (range clamping happens in [`apply_setting`]); string keys accept anything.
///
/// # Errors
///
/// Returns an error if the value cannot be parsed for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    if BOOL_KEYS.contains(&key) && parse_bool(value).is_none() {
        return Err(invalid(key, value, "true, false"));
    }
    if INTEGER_KEYS.contains(&key) && value.parse::<u64>().is_err() {
        return Err(invalid(key, value, "a non-negative integer"));
    }
    Ok(())
}

fn invalid(key: &str, value: &str, valid: &str) -> anyhow::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        valid: valid.to_string(),
    }
    .into()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn optional(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// Applies a validated key/value to `settings`.
///
/// Numeric values outside their supported range are clamped. Returns the
/// value actually stored, for display.
///
/// # Errors
///
/// Returns an error if the key or value is invalid.
pub fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> Result<String> {
    validate_config_key(key)?;
    validate_config_value(key, value)?;
    let as_u64 = || value.parse::<u64>().unwrap_or_default();
    let as_bool = || parse_bool(value).unwrap_or_default();
    match key {
        "ssh_concurrency" => {
            let n = usize::try_from(as_u64()).unwrap_or(usize::MAX);
            settings.ssh_concurrency =
                n.clamp(*SSH_CONCURRENCY_RANGE.start(), *SSH_CONCURRENCY_RANGE.end());
            return Ok(settings.ssh_concurrency.to_string());
        }
        "command_timeout_secs" => {
            settings.command_timeout_secs =
                as_u64().clamp(*COMMAND_TIMEOUT_RANGE.start(), *COMMAND_TIMEOUT_RANGE.end());
            return Ok(settings.command_timeout_secs.to_string());
        }
        "connect_timeout_secs" => {
            settings.connect_timeout_secs = as_u64().clamp(1, 120);
            return Ok(settings.connect_timeout_secs.to_string());
        }
        "proxy.enabled" => settings.proxy.enabled = as_bool(),
        "proxy.local_only" => settings.proxy.local_only = as_bool(),
        "registry.enabled" => settings.registry.enabled = as_bool(),
        "proxy.http" => settings.proxy.http = optional(value),
        "proxy.https" => settings.proxy.https = optional(value),
        "proxy.no_proxy" => settings.proxy.no_proxy = optional(value),
        "registry.server" => settings.registry.server = optional(value),
        "registry.username" => settings.registry.username = optional(value),
        "registry.password" => settings.registry.password = optional(value),
        _ => {}
    }
    Ok(get_setting(settings, key).unwrap_or_default())
}

/// Reads one key as display text. Secret keys are masked.
#[must_use]
pub fn get_setting(settings: &Settings, key: &str) -> Option<String> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let value = match key {
        "ssh_concurrency" => settings.ssh_concurrency.to_string(),
        "command_timeout_secs" => settings.command_timeout_secs.to_string(),
        "connect_timeout_secs" => settings.connect_timeout_secs.to_string(),
        "proxy.enabled" => settings.proxy.enabled.to_string(),
        "proxy.http" => opt(&settings.proxy.http),
        "proxy.https" => opt(&settings.proxy.https),
        "proxy.no_proxy" => opt(&settings.proxy.no_proxy),
        "proxy.local_only" => settings.proxy.local_only.to_string(),
        "registry.enabled" => settings.registry.enabled.to_string(),
        "registry.server" => opt(&settings.registry.server),
        "registry.username" => opt(&settings.registry.username),
        "registry.password" => {
            if settings.registry.password.is_some() {
                "********".to_string()
            } else {
                String::new()
            }
        }
        _ => return None,
    };
    Some(value)
}

// ── Unit tests ───────────────────────────────────────────────────────────────
