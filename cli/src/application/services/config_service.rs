//! Application service — settings use-cases.

use anyhow::{Context, Result};

use dockhand_common::Settings;

use crate::application::ports::{SecretStore, SettingsStore};
use crate::domain::config::{SECRET_KEYS, apply_setting, validate_config_key, validate_config_value};

/// Load settings.
pub fn load_settings(store: &dyn SettingsStore) -> Result<Settings> {
    store.load()
}

/// Validate, apply and persist one setting. Secret values are encrypted
/// before they reach the settings file.
///
/// Returns the value as displayed after clamping (secrets masked).
pub fn set_setting(
    store: &dyn SettingsStore,
    secrets: &dyn SecretStore,
    key: &str,
    value: &str,
) -> Result<String> {
    validate_config_key(key)?;
    validate_config_value(key, value)?;
    let stored = if SECRET_KEYS.contains(&key) && !value.is_empty() {
        secrets
            .encrypt(value)
            .with_context(|| format!("cannot encrypt {key}"))?
    } else {
        value.to_string()
    };
    let mut settings = store.load()?;
    let shown = apply_setting(&mut settings, key, &stored)?;
    store.save(&settings)?;
    Ok(shown)
}
