//! Locations of dockhand's on-disk state.

use std::path::PathBuf;

use anyhow::Result;

/// Overrides the data directory (default `~/.dockhand`).
pub const HOME_ENV: &str = "DOCKHAND_HOME";

/// Data directory holding settings, inventory and registries.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(val) = std::env::var(HOME_ENV) {
        if !val.is_empty() {
            return Ok(PathBuf::from(val));
        }
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".dockhand"))
}

/// `$DOCKHAND_HOME/<name>`, or the path in `env_override` when it is set.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn data_file(env_override: &str, name: &str) -> Result<PathBuf> {
    if let Ok(val) = std::env::var(env_override) {
        if !val.is_empty() {
            return Ok(PathBuf::from(val));
        }
    }
    Ok(data_dir()?.join(name))
}
