//! Infrastructure implementation of the `SettingsStore` port.

use anyhow::{Context, Result};
use std::path::PathBuf;

use dockhand_common::Settings;

use crate::application::ports::SettingsStore;
use crate::infra::paths::data_file;

/// Overrides the settings file path.
pub const SETTINGS_ENV: &str = "DOCKHAND_SETTINGS";

/// Settings kept in a YAML file on disk, re-read on every `load`.
#[derive(Default)]
pub struct YamlSettingsStore {
    path: Option<PathBuf>,
}

impl YamlSettingsStore {
    /// Store at an explicit path (used in tests).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }
}

impl SettingsStore for YamlSettingsStore {
    fn load(&self) -> Result<Settings> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let path = self.path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(settings).context("cannot serialize settings")?;
        std::fs::write(&path, content)
            .with_context(|| format!("cannot write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("cannot set permissions on {}", path.display()))?;
        }
        Ok(())
    }

    fn path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(p) => Ok(p.clone()),
            None => data_file(SETTINGS_ENV, "settings.yaml"),
        }
    }
}
