//! JSON output helpers.
//!
//! `JsonRenderer` prints command results as pretty JSON on stdout;
//! `format_error` builds the error object every `--json` code path emits
//! when a command fails.

use anyhow::{Context, Result};
use serde::Serialize;

use dockhand_common::Settings;

use crate::domain::config::{VALID_CONFIG_KEYS, get_setting};

/// Renders results as JSON on stdout.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let out = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
        println!("{out}");
        Ok(())
    }

    /// Settings as a flat key map (secrets masked) plus the file path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_config(&self, settings: &Settings, path: &std::path::Path) -> Result<()> {
        let mut values = serde_json::Map::new();
        for key in VALID_CONFIG_KEYS {
            values.insert(
                (*key).to_string(),
                get_setting(settings, key).unwrap_or_default().into(),
            );
        }
        self.render(&serde_json::json!({
            "path": path.display().to_string(),
            "settings": values,
        }))
    }
}

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}
